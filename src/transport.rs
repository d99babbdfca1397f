use serialport::SerialPort;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::time::Duration;

/// Read timeout used when none is configured. Keeps the reader loop responsive
/// to shutdown requests.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by device")]
    Closed,
}

/// Reading half of an open link.
pub trait LineSource: Send {
    /// Block until a full line arrives or the read timeout elapses.
    ///
    /// Returns `Ok(None)` on timeout. The returned line has its `\r`/`\n`
    /// terminators removed.
    fn read_line(&mut self) -> Result<Option<String>, TransportError>;
}

/// Writing half of an open link.
pub trait LineSink: Send {
    /// Write `text` followed by a newline.
    fn write_line(&mut self, text: &str) -> Result<(), TransportError>;
}

/// Opens links to a device. The serial implementation is [`SerialConnector`];
/// tests substitute an in-memory device.
pub trait Connector: Send + Sync {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
    ) -> Result<(Box<dyn LineSource>, Box<dyn LineSink>), TransportError>;
}

#[derive(Debug, Clone)]
pub struct SerialConnector {
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl Connector for SerialConnector {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
    ) -> Result<(Box<dyn LineSource>, Box<dyn LineSink>), TransportError> {
        log::debug!("Opening {} at {} baud", port, baud_rate);
        let serial = serialport::new(port, baud_rate)
            .timeout(self.read_timeout)
            .open()?;
        serial.clear(serialport::ClearBuffer::All)?;
        let reader = serial.try_clone()?;

        Ok((
            Box::new(SerialLineReader::new(reader)),
            Box::new(SerialLineWriter { serial }),
        ))
    }
}

pub struct SerialLineReader<R> {
    reader: BufReader<R>,
    partial: Vec<u8>,
}

impl<R: std::io::Read> SerialLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            partial: Vec::new(),
        }
    }
}

impl<R: std::io::Read + Send> LineSource for SerialLineReader<R> {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        // read_until keeps the bytes it consumed when the port times out, so a
        // line split across two timeouts is reassembled here.
        match self.reader.read_until(b'\n', &mut self.partial) {
            Ok(0) => Err(TransportError::Closed),
            Ok(_) if self.partial.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&self.partial)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                self.partial.clear();
                Ok(Some(line))
            }
            // EOF in the middle of a line
            Ok(_) => Err(TransportError::Closed),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct SerialLineWriter {
    serial: Box<dyn SerialPort>,
}

impl LineSink for SerialLineWriter {
    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        let command_with_newline = format!("{}\n", text);
        self.serial.write_all(command_with_newline.as_bytes())?;
        self.serial.flush()?;
        Ok(())
    }
}
