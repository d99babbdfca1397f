/// Device path patterns, in listing order: USB-serial adapters, CDC ACM,
/// macOS tty/cu devices and Bluetooth RFCOMM links.
pub const CANDIDATE_PATTERNS: [&str; 5] = [
    "/dev/ttyUSB*",
    "/dev/ttyACM*",
    "/dev/tty.*",
    "/dev/cu.*",
    "/dev/rfcomm*",
];

/// List the device paths a Zemote could be attached to.
///
/// An empty list is a normal result when nothing is plugged in.
pub fn list_candidate_ports() -> Vec<String> {
    list_matching(&CANDIDATE_PATTERNS)
}

/// Expand each glob pattern and concatenate the matches in pattern order.
///
/// Invalid patterns and unreadable entries are skipped.
pub fn list_matching(patterns: &[&str]) -> Vec<String> {
    let mut ports = Vec::new();
    for pattern in patterns {
        match glob::glob(pattern) {
            Ok(paths) => {
                ports.extend(
                    paths
                        .flatten()
                        .map(|path| path.to_string_lossy().into_owned()),
                );
            }
            Err(e) => log::warn!("Skipping port pattern {}: {}", pattern, e),
        }
    }
    log::debug!("Candidate ports: {:?}", ports);
    ports
}
