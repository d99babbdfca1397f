//! Line protocol spoken by the Zemote firmware.
//!
//! Commands are a single op letter, optionally followed by a decimal button
//! index. The firmware acknowledges with `ok - <op>` and rejects with
//! `error - <op>`.

use std::fmt;

/// Number of soft buttons, counting every button and channel.
pub const NUM_BUTTONS: usize = 9;

/// Acknowledgement of `F`, sent when the device leaves program mode.
pub const PROGRAM_EXIT_MARKER: &str = "ok - F";

/// Sent instead of [`PROGRAM_EXIT_MARKER`] when the button has recorded as many
/// IR codes as it can hold; the device has left program mode on its own.
pub const BUFFER_FULL_MARKER: &str = "ok - B";

/// Byte offset of the recorded length inside the program-exit line.
///
/// This is a wire-compatibility constraint: the firmware appends the length
/// directly after the marker and nothing delimits it.
pub const EXIT_LENGTH_OFFSET: usize = 6;

/// Substring of the `M` reply when the device runs in simple mode.
pub const SIMPLE_MODE_MARKER: &str = "Simple";

const NAK_PREFIX: &str = "error - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Record IR codes for a button
    StartProgram(usize),
    EndProgram,
    /// One length line per button
    ListLengths,
    ButtonInfo(usize),
    TestButton(usize),
    /// Save to EEPROM
    Save,
    /// Reload everything from EEPROM
    Reset,
    QueryMode,
    /// `true` selects simple mode
    SetSimpleMode(bool),
}

impl Command {
    pub fn op(&self) -> char {
        match self {
            Command::StartProgram(_) => 'P',
            Command::EndProgram => 'F',
            Command::ListLengths => 'L',
            Command::ButtonInfo(_) => 'G',
            Command::TestButton(_) => 'T',
            Command::Save => 'S',
            Command::Reset => 'R',
            Command::QueryMode => 'M',
            Command::SetSimpleMode(_) => 'X',
        }
    }

    /// The button this command addresses, if any.
    pub fn button(&self) -> Option<usize> {
        match self {
            Command::StartProgram(i) | Command::ButtonInfo(i) | Command::TestButton(i) => Some(*i),
            _ => None,
        }
    }

    /// How many reply lines a synchronous query waits for.
    pub fn expected_replies(&self) -> usize {
        match self {
            Command::ListLengths => NUM_BUTTONS,
            Command::QueryMode => 1,
            _ => 0,
        }
    }

    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetSimpleMode(simple) => write!(f, "X{}", u8::from(*simple)),
            cmd => match cmd.button() {
                Some(index) => write!(f, "{}{}", cmd.op(), index),
                None => write!(f, "{}", cmd.op()),
            },
        }
    }
}

/// What a received line means to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Device left program mode. `length` is `None` when the line is too short
    /// to carry one.
    ProgramExit { length: Option<String> },
    /// Device left program mode because the button's command buffer is full.
    BufferFull,
    /// Device rejected the command with this op.
    Nak(String),
    Data,
}

impl Reply {
    pub fn classify(line: &str) -> Self {
        if line.contains(PROGRAM_EXIT_MARKER) {
            let length = line
                .get(EXIT_LENGTH_OFFSET..)
                .and_then(|rest| rest.chars().next())
                .map(String::from);
            return Reply::ProgramExit { length };
        }
        if line.contains(BUFFER_FULL_MARKER) {
            return Reply::BufferFull;
        }
        if let Some(op) = line.strip_prefix(NAK_PREFIX) {
            return Reply::Nak(op.trim().to_string());
        }
        Reply::Data
    }
}

/// Interpret the reply to `M`.
pub fn is_simple_mode(reply: &str) -> bool {
    reply.contains(SIMPLE_MODE_MARKER)
}

/// Interpret one line of the reply to `L`.
pub fn parse_length(reply: &str) -> String {
    reply.trim_end().to_string()
}
