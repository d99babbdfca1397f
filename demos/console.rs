// Interactive console example
//
// Connects to a Zemote, prints everything the device says and lets you type
// commands. Besides raw protocol lines the console understands a few words:
//
//   program <n>   enter program mode for button n
//   done          leave program mode
//   lengths       re-read all button lengths
//   mode          re-read the mode
//   switch        toggle simple/advanced mode
//   test <n>      fire button n
//   save / reset  write to / reload from EEPROM
//   quit

use clap::Parser;
use std::io::BufRead;
use std::time::Duration;
use zemote_host::{Session, SessionConfig, SessionError, SessionEvent};

#[derive(Parser)]
#[command(name = "console")]
#[command(version = "1.0")]
#[command(about = "Interactive console for a Zemote device")]
struct Args {
    /// Serial port; the first candidate port is used when omitted
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = 9600)]
    baud: u32,

    /// Seconds to wait for the device to boot after opening the port
    #[arg(long, default_value_t = 2)]
    settle: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn run_command(session: &Session, line: &str) -> Result<(), SessionError> {
    let mut words = line.split_whitespace();
    let index = |word: Option<&str>| word.and_then(|w| w.parse::<usize>().ok());
    match words.next() {
        Some("program") => match index(words.next()) {
            Some(i) => session.enter_program_mode(i),
            None => session.send(line),
        },
        Some("test") => match index(words.next()) {
            Some(i) => session.test_button(i),
            None => session.send(line),
        },
        Some("done") => session.exit_program_mode(),
        Some("lengths") => session.get_all_button_lengths(),
        Some("mode") => session.get_mode(),
        Some("switch") => session.switch_mode(),
        Some("save") => session.save_to_storage(),
        Some("reset") => session.reset_to_storage(),
        _ => session.send(line),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let port = match args.port {
        Some(port) => port,
        None => Session::list_candidate_ports()
            .into_iter()
            .next()
            .ok_or("No candidate port found, pass --port")?,
    };

    let config = SessionConfig::default().with_settle_delay(Duration::from_secs(args.settle));
    let session = Session::new(config);
    session.subscribe(|event: &SessionEvent| match event {
        SessionEvent::LineReceived(line) => println!("{}", line),
        SessionEvent::Status(text) => println!("[{}]", text),
        SessionEvent::ButtonLength { index, length } => {
            println!("[button {} holds {} command(s)]", index, length);
        }
        SessionEvent::ProgramMode(change) => println!("[program mode {:?}]", change),
        SessionEvent::ModeChanged | SessionEvent::ConnectionAction(_) => {}
    });

    println!("Connecting to {} at {} baud...", port, args.baud);
    session.connect(Some(&port), Some(args.baud))?;
    println!(
        "Connected, {} mode. Type commands, 'quit' to exit.\n",
        if session.simple_mode_enabled() { "simple" } else { "advanced" }
    );

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        if let Err(e) = run_command(&session, line) {
            eprintln!("Error: {}", e);
            if !session.is_connected() {
                break;
            }
        }
    }

    if session.is_connected() {
        session.disconnect()?;
    }
    Ok(())
}
