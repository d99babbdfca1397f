// Port discovery example
//
// Lists the device paths a Zemote could be attached to.

use zemote_host::Session;

fn main() {
    env_logger::init();

    println!("Zemote Port Discovery");
    println!("=====================\n");

    let ports = Session::list_candidate_ports();
    if ports.is_empty() {
        println!("No candidate ports found. Plug in a device and try again.");
        return;
    }

    println!("Found {} candidate port(s):", ports.len());
    for (i, port) in ports.iter().enumerate() {
        println!("  {}. {}", i + 1, port);
    }
}
