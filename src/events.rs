use std::sync::Arc;

/// Prefix put in front of every command echoed to listeners.
pub const SENT_PREFIX: &str = ">>> ";

/// Which connection action the UI should offer next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    ConnectAvailable,
    DisconnectAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramModeChange {
    Entered,
    Exited,
}

/// Notifications pushed by a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A line read from the device, or a sent command prefixed with [`SENT_PREFIX`].
    LineReceived(String),
    ConnectionAction(ConnectionAction),
    /// Human readable status text
    Status(String),
    ProgramMode(ProgramModeChange),
    ButtonLength { index: usize, length: String },
    /// Simple/advanced mode changed or was re-read
    ModeChanged,
}

/// Receives session notifications.
///
/// Called on whichever thread produced the event, the caller's or the
/// background reader's. Implementations must not block for long and must
/// marshal to their own thread if they need to.
pub trait SessionListener: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event);
    }
}

#[derive(Default, Clone)]
pub(crate) struct Listeners {
    listeners: Vec<Arc<dyn SessionListener>>,
}

impl Listeners {
    pub(crate) fn push(&mut self, listener: Arc<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }
}
