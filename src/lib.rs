//! # Zemote Host
//!
//! Host-side serial session engine for Zemote IR macro-button devices.
//!
//! The device speaks a line protocol: the host sends a single op letter,
//! optionally followed by a button index, and the device answers with free
//! text lines. A [`Session`] owns the serial link, runs a background reader
//! that turns those lines into state updates, and pushes [`SessionEvent`]s to
//! any number of subscribed listeners.
//!
//! ## Features
//!
//! - **Port discovery**: globbing of the usual USB-serial, ACM, macOS and RFCOMM device paths
//! - **Synchronous queries**: `L` and `M` block until their reply lines arrive, bounded by a timeout
//! - **Program mode tracking**: the recorded length is picked up from the device's acknowledgement
//! - **Self-healing link**: a read failure disconnects the session cleanly
//!
//! ## Example
//!
//! ```rust,no_run
//! use zemote_host::{Session, SessionConfig, SessionEvent};
//!
//! let session = Session::new(SessionConfig::default());
//! session.subscribe(|event: &SessionEvent| println!("{:?}", event));
//!
//! let port = Session::list_candidate_ports()
//!     .into_iter()
//!     .next()
//!     .ok_or("no device attached")?;
//! session.connect(Some(&port), Some(9600))?;
//! println!("Button lengths: {:?}", session.button_lengths());
//!
//! session.enter_program_mode(0)?;
//! // ... point a remote at the device ...
//! session.exit_program_mode()?;
//!
//! session.save_to_storage()?;
//! session.disconnect()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod collector;
pub mod events;
pub mod port_scanner;
pub mod protocol;
mod reader;
pub mod session;
pub mod transport;

#[cfg(test)]
mod sim;

pub use collector::{CollectorError, ResponseCollector};
pub use events::{ConnectionAction, ProgramModeChange, SessionEvent, SessionListener};
pub use port_scanner::list_candidate_ports;
pub use protocol::{Command, NUM_BUTTONS};
pub use session::{Session, SessionConfig, SessionError, SessionState};
pub use transport::{Connector, LineSink, LineSource, SerialConnector, TransportError};
