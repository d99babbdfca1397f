use crate::collector::{CollectorError, ResponseCollector};
use crate::events::{
    ConnectionAction, Listeners, ProgramModeChange, SessionEvent, SessionListener, SENT_PREFIX,
};
use crate::port_scanner;
use crate::protocol::{self, Command, NUM_BUTTONS};
use crate::reader;
use crate::transport::{Connector, LineSink, SerialConnector, TransportError, DEFAULT_READ_TIMEOUT};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot open {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("IO error: {0}")]
    Io(#[source] TransportError),

    #[error("No reply to '{command}': got {received} of {expected} lines")]
    ProtocolTimeout {
        command: String,
        expected: usize,
        received: usize,
    },

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Port and baud rate must both be set before connecting")]
    MissingSettings,

    #[error("Another query is still waiting for its reply")]
    CollectorBusy,

    #[error("Button index {0} out of range, must be below {max}", max = NUM_BUTTONS)]
    InvalidButton(usize),

    #[error("Query cancelled by disconnect")]
    Cancelled,
}

impl SessionError {
    fn from_collector(command: Command, err: CollectorError) -> Self {
        match err {
            CollectorError::Busy => Self::CollectorBusy,
            CollectorError::Cancelled => Self::Cancelled,
            CollectorError::Timeout { received, expected } => Self::ProtocolTimeout {
                command: command.to_wire(),
                expected,
                received,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name used in status messages
    pub device_name: String,
    /// Pause after opening the port so the device can finish booting
    pub settle_delay: Duration,
    /// Pause between the two initialization queries
    pub query_delay: Duration,
    /// Upper bound on waiting for the reply to `L` or `M`
    pub reply_timeout: Duration,
    /// Serial read timeout; bounds how long the reader takes to notice a disconnect
    pub read_timeout: Duration,
}

impl SessionConfig {
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: "Zemote Host".to_string(),
            settle_delay: Duration::from_secs(2),
            query_delay: Duration::from_secs(1),
            reply_timeout: Duration::from_secs(5),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Everything the host knows about the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub program_mode: bool,
    pub simple_mode_enabled: bool,
    /// Button being programmed
    pub active_button: Option<usize>,
    pub button_lengths: [String; NUM_BUTTONS],
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connected: false,
            port: None,
            baud_rate: None,
            program_mode: false,
            simple_mode_enabled: false,
            active_button: None,
            button_lengths: std::array::from_fn(|_| "0".to_string()),
        }
    }
}

/// An open connection. Dropping the writer releases the port once the reader
/// thread has let go of its half.
struct Link {
    writer: Box<dyn LineSink>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// State shared between the session and its reader thread.
pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) collector: ResponseCollector,
    link: Mutex<Option<Link>>,
    listeners: RwLock<Listeners>,
}

impl Shared {
    pub(crate) fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState::default()),
            collector: ResponseCollector::new(),
            link: Mutex::new(None),
            listeners: RwLock::new(Listeners::default()),
        }
    }

    pub(crate) fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        let listeners = self.listeners.read().clone();
        listeners.emit(event);
    }

    fn status(&self, text: String) {
        self.emit(&SessionEvent::Status(text));
    }

    /// Teardown on an internal failure path, where the link may already be gone.
    pub(crate) fn teardown_quietly(&self, owner: Option<&Arc<AtomicBool>>) {
        if let Err(e) = self.teardown(owner) {
            log::debug!("Nothing to tear down: {}", e);
        }
    }

    /// Close the current connection.
    ///
    /// With `owner` set, only the connection using that continue flag is torn
    /// down; a reader from an earlier connection can not close a newer one.
    pub(crate) fn teardown(&self, owner: Option<&Arc<AtomicBool>>) -> Result<(), SessionError> {
        let link = {
            let mut link = self.link.lock();
            match (link.as_ref(), owner) {
                (Some(current), Some(flag)) if !Arc::ptr_eq(&current.running, flag) => None,
                _ => link.take(),
            }
        };
        let Some(Link {
            writer,
            running,
            reader,
        }) = link
        else {
            return Err(SessionError::NotConnected);
        };

        drop(writer);
        running.store(false, Ordering::SeqCst);
        self.state.lock().connected = false;
        self.collector.cancel();

        if let Some(handle) = reader {
            // The reader tears down its own connection on read failure and
            // can not join itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::warn!("Reader thread panicked");
            }
        }

        log::info!("{} is disconnected", self.config.device_name);
        self.emit(&SessionEvent::ConnectionAction(
            ConnectionAction::ConnectAvailable,
        ));
        self.status(format!("{} is disconnected!", self.config.device_name));
        Ok(())
    }
}

/// A connection to one Zemote device and the command API on top of it.
///
/// All methods take `&self`; a session can be shared between the UI thread
/// and worker threads behind an `Arc`.
pub struct Session {
    shared: Arc<Shared>,
    connector: Box<dyn Connector>,
}

impl Session {
    /// Create a session talking to real serial ports.
    pub fn new(config: SessionConfig) -> Self {
        let connector = SerialConnector::new(config.read_timeout);
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: SessionConfig, connector: impl Connector + 'static) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
            connector: Box::new(connector),
        }
    }

    pub fn subscribe(&self, listener: impl SessionListener + 'static) {
        self.shared.subscribe(Arc::new(listener));
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    pub fn program_mode(&self) -> bool {
        self.shared.state.lock().program_mode
    }

    pub fn simple_mode_enabled(&self) -> bool {
        self.shared.state.lock().simple_mode_enabled
    }

    pub fn button_lengths(&self) -> [String; NUM_BUTTONS] {
        self.shared.state.lock().button_lengths.clone()
    }

    pub fn list_candidate_ports() -> Vec<String> {
        port_scanner::list_candidate_ports()
    }

    /// Open the port and read the device's lengths and mode.
    ///
    /// `port` and `baud_rate` are remembered, so a later call may omit them.
    pub fn connect(&self, port: Option<&str>, baud_rate: Option<u32>) -> Result<(), SessionError> {
        let (port, baud_rate) = {
            let mut state = self.shared.state.lock();
            if let Some(port) = port {
                state.port = Some(port.to_string());
            }
            if let Some(baud_rate) = baud_rate {
                state.baud_rate = Some(baud_rate);
            }
            match (&state.port, state.baud_rate) {
                (Some(port), Some(baud_rate)) => (port.clone(), baud_rate),
                _ => return Err(SessionError::MissingSettings),
            }
        };

        let (source, running) = {
            let mut link = self.shared.link.lock();
            if link.is_some() {
                return Err(SessionError::AlreadyConnected);
            }

            let (source, writer) = self.connector.open(&port, baud_rate).map_err(|source| {
                log::warn!("{} cannot be connected on {}: {}", self.shared.config.device_name, port, source);
                SessionError::Connection {
                    port: port.clone(),
                    source,
                }
            })?;

            let running = Arc::new(AtomicBool::new(true));
            *link = Some(Link {
                writer,
                running: Arc::clone(&running),
                reader: None,
            });
            self.shared.state.lock().connected = true;
            (source, running)
        };

        log::info!("{} is connected on {} at {} baud", self.shared.config.device_name, port, baud_rate);
        self.shared.emit(&SessionEvent::ConnectionAction(
            ConnectionAction::DisconnectAvailable,
        ));
        self.shared
            .status(format!("{} is connected!", self.shared.config.device_name));

        match reader::spawn(Arc::clone(&self.shared), source, Arc::clone(&running)) {
            Ok(handle) => {
                let mut link = self.shared.link.lock();
                // If the link is already gone the thread sees its cleared flag and exits
                if let Some(current) = link
                    .as_mut()
                    .filter(|current| Arc::ptr_eq(&current.running, &running))
                {
                    current.reader = Some(handle);
                }
            }
            Err(e) => {
                self.shared.teardown_quietly(Some(&running));
                return Err(SessionError::Io(e.into()));
            }
        }

        if let Err(e) = self.initialize() {
            log::warn!("Device initialization failed: {}", e);
            self.shared.teardown_quietly(Some(&running));
            return Err(e);
        }
        Ok(())
    }

    fn initialize(&self) -> Result<(), SessionError> {
        thread::sleep(self.shared.config.settle_delay);
        self.get_all_button_lengths()?;
        thread::sleep(self.shared.config.query_delay);
        self.get_mode()
    }

    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.shared.teardown(None).inspect_err(|_| {
            log::debug!("{} cannot be disconnected: not connected", self.shared.config.device_name);
        })
    }

    /// Write one raw command line and echo it to listeners.
    pub fn send(&self, text: &str) -> Result<(), SessionError> {
        let result = match self.shared.link.lock().as_mut() {
            Some(link) => link.writer.write_line(text).map_err(SessionError::Io),
            None => Err(SessionError::NotConnected),
        };

        match result {
            Ok(()) => {
                log::debug!("SND: {}", text);
                self.shared
                    .emit(&SessionEvent::LineReceived(format!("{SENT_PREFIX}{text}")));
                Ok(())
            }
            Err(SessionError::NotConnected) => {
                self.shared
                    .status(format!("{} is not connected", self.shared.config.device_name));
                Err(SessionError::NotConnected)
            }
            Err(e) => {
                log::warn!("Failed to write '{}': {}", text, e);
                self.shared
                    .status(format!("Fail to write to {}", self.shared.config.device_name));
                // A dead writer means a dead link
                self.shared.teardown_quietly(None);
                Err(e)
            }
        }
    }

    fn send_command(&self, command: Command) -> Result<(), SessionError> {
        if let Some(index) = command.button() {
            if index >= NUM_BUTTONS {
                return Err(SessionError::InvalidButton(index));
            }
        }
        self.send(&command.to_wire())
    }

    /// Send a query and wait for its reply lines.
    fn query(&self, command: Command) -> Result<Vec<String>, SessionError> {
        let collector = &self.shared.collector;
        // Armed before writing so a fast reply is not missed
        collector
            .arm(command.expected_replies())
            .map_err(|e| SessionError::from_collector(command, e))?;

        if let Err(e) = self.send_command(command) {
            collector.disarm();
            return Err(e);
        }

        collector
            .wait_complete(self.shared.config.reply_timeout)
            .map_err(|e| {
                let err = SessionError::from_collector(command, e);
                log::warn!("{}", err);
                err
            })
    }

    /// Put button `index` into program mode; the device records IR codes
    /// until [`exit_program_mode`](Self::exit_program_mode).
    pub fn enter_program_mode(&self, index: usize) -> Result<(), SessionError> {
        self.send_command(Command::StartProgram(index))?;
        {
            let mut state = self.shared.state.lock();
            state.active_button = Some(index);
            state.program_mode = true;
        }
        self.shared
            .emit(&SessionEvent::ProgramMode(ProgramModeChange::Entered));
        Ok(())
    }

    /// The device's acknowledgement, carrying the recorded length, is handled
    /// by the reader.
    pub fn exit_program_mode(&self) -> Result<(), SessionError> {
        self.send_command(Command::EndProgram)?;
        self.shared.state.lock().program_mode = false;
        Ok(())
    }

    pub fn get_all_button_lengths(&self) -> Result<(), SessionError> {
        let lines = self.query(Command::ListLengths)?;

        let updates: Vec<(usize, String)> = lines
            .iter()
            .take(NUM_BUTTONS)
            .map(|line| protocol::parse_length(line))
            .enumerate()
            .collect();
        {
            let mut state = self.shared.state.lock();
            for (index, length) in &updates {
                state.button_lengths[*index].clone_from(length);
            }
        }
        for (index, length) in updates {
            self.shared
                .emit(&SessionEvent::ButtonLength { index, length });
        }
        Ok(())
    }

    pub fn get_button_info(&self, index: usize) -> Result<(), SessionError> {
        self.send_command(Command::ButtonInfo(index))
    }

    pub fn test_button(&self, index: usize) -> Result<(), SessionError> {
        self.send_command(Command::TestButton(index))
    }

    /// Persist the current configuration to the device's EEPROM.
    pub fn save_to_storage(&self) -> Result<(), SessionError> {
        self.send_command(Command::Save)
    }

    /// Reload every button from EEPROM.
    pub fn reset_to_storage(&self) -> Result<(), SessionError> {
        self.send_command(Command::Reset)
    }

    pub fn get_mode(&self) -> Result<(), SessionError> {
        let lines = self.query(Command::QueryMode)?;
        let simple = lines.first().is_some_and(|line| protocol::is_simple_mode(line));
        self.shared.state.lock().simple_mode_enabled = simple;
        self.shared.emit(&SessionEvent::ModeChanged);
        Ok(())
    }

    /// Toggle simple/advanced mode. Not verified against the reply.
    pub fn switch_mode(&self) -> Result<(), SessionError> {
        let simple = self.simple_mode_enabled();
        self.send_command(Command::SetSimpleMode(!simple))?;
        self.shared.state.lock().simple_mode_enabled = !simple;
        self.shared.emit(&SessionEvent::ModeChanged);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.teardown_quietly(None);
    }
}
