//! Background line reader.
//!
//! One thread per connection reads lines from the device, feeds the armed
//! collector, applies the program-mode exit to the session state and forwards
//! every line to the listeners.

use crate::events::{ProgramModeChange, SessionEvent};
use crate::protocol::Reply;
use crate::session::Shared;
use crate::transport::LineSource;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) fn spawn(
    shared: Arc<Shared>,
    source: Box<dyn LineSource>,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("zemote-reader".to_string())
        .spawn(move || run(&shared, source, &running))
}

fn run(shared: &Shared, mut source: Box<dyn LineSource>, running: &Arc<AtomicBool>) {
    log::debug!("Reader thread started");
    while running.load(Ordering::SeqCst) {
        match source.read_line() {
            Ok(Some(line)) => handle_line(shared, &line),
            Ok(None) => continue,
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    log::warn!("Failed to receive from serial device, disconnecting: {}", e);
                    shared.teardown_quietly(Some(running));
                }
                break;
            }
        }
    }
    log::debug!("Reader thread exiting");
}

pub(crate) fn handle_line(shared: &Shared, line: &str) {
    log::debug!("RCV: {}", line);
    shared.collector.offer(line);

    let mut events = Vec::new();
    match Reply::classify(line) {
        Reply::ProgramExit { length } => {
            let mut state = shared.state.lock();
            state.program_mode = false;
            events.push(SessionEvent::ProgramMode(ProgramModeChange::Exited));

            match (state.active_button.take(), length) {
                (Some(index), Some(length)) => {
                    state.button_lengths[index].clone_from(&length);
                    events.push(SessionEvent::ButtonLength { index, length });
                }
                (Some(index), None) => {
                    log::warn!("No length for button {} in {:?}", index, line);
                }
                (None, _) => log::warn!("Program mode ended with no active button"),
            }
        }
        Reply::BufferFull => {
            let mut state = shared.state.lock();
            state.program_mode = false;
            if let Some(index) = state.active_button.take() {
                log::info!("Command buffer of button {} is full", index);
            }
            events.push(SessionEvent::ProgramMode(ProgramModeChange::Exited));
        }
        Reply::Nak(op) => log::warn!("Device rejected command {}", op),
        Reply::Data => {}
    }
    events.push(SessionEvent::LineReceived(line.to_string()));

    for event in &events {
        shared.emit(event);
    }
}
