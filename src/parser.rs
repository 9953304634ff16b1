//! Serial control protocol.
//!
//! A byte-oriented state machine fed from the UART receive path. Commands
//! are single characters, optionally followed by text arguments (hex byte
//! values) or a length-prefixed binary blob, and terminated by CR or LF.
//! Replies start with `+` (success or data) or `-` (error).

use crate::error::ErrorCode;
use crate::executor::Executor;
use crate::opcode::Opcode;
use crate::strip::StripDriver;
use crate::ResponseSink;

#[cfg(feature = "log")]
use esp_println::println;

/// Startup handshake the host sends when the startup-signal option is on.
const READY_SIGNAL: &[u8] = b"?READY?";

/// Bytes of binary payload between progress reports.
const PROGRESS_CHUNK: u16 = 64;

/// Boot-time configuration of the parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserConfig {
    /// Ignore all input until the host sends `?READY?` and a newline
    pub startup_signal: bool,
}

/// Host commands. The command byte itself is the protocol opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Rewind,
    Capacity,
    Resume,
    Suspend,
    Terminate,
    Upload,
    UploadBin,
    Version,
    Execute,
    ExecuteBin,
    Query,
}

impl Command {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            b'<' => Self::Rewind,
            b'c' => Self::Capacity,
            b'r' => Self::Resume,
            b's' => Self::Suspend,
            b't' => Self::Terminate,
            b'u' => Self::Upload,
            b'U' => Self::UploadBin,
            b'v' => Self::Version,
            b'x' => Self::Execute,
            b'X' => Self::ExecuteBin,
            b'?' => Self::Query,
            _ => return None,
        })
    }

    /// Whether argument bytes are written into the bytecode store.
    fn writes_bytecode(self) -> bool {
        matches!(
            self,
            Self::Upload | Self::UploadBin | Self::Execute | Self::ExecuteBin
        )
    }

    /// Whether a terminating `END` is appended before execution.
    fn appends_end(self) -> bool {
        matches!(self, Self::Execute | Self::ExecuteBin)
    }

    fn takes_binary_frame(self) -> bool {
        matches!(self, Self::UploadBin | Self::ExecuteBin)
    }

    fn takes_text_args(self) -> bool {
        matches!(self, Self::Upload | Self::Execute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    TextArgs,
    BinLen1,
    BinLen2,
    BinData,
    NoArgs,
    IgnoredArgs,
    Trap,
}

fn is_newline(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

fn is_separator(byte: u8) -> bool {
    byte == b' ' || byte == b'\t' || byte == b',' || byte == b';'
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Protocol parser driving an [`Executor`].
pub struct Parser {
    state: State,
    command: Option<Command>,
    current_arg: Option<u8>,
    frame_len: u16,
    remaining: u16,
    error: ErrorCode,
    /// Bytes of [`READY_SIGNAL`] matched so far; `None` once the gate is
    /// open (or was never configured)
    gate: Option<usize>,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            state: State::Start,
            command: None,
            current_arg: None,
            frame_len: 0,
            remaining: 0,
            error: ErrorCode::Success,
            gate: config.startup_signal.then_some(0),
        }
    }

    /// Reset to the initial state (the startup gate, once passed, stays
    /// open).
    pub fn reset(&mut self) {
        self.state = State::Start;
        self.command = None;
        self.current_arg = None;
        self.frame_len = 0;
        self.remaining = 0;
        self.error = ErrorCode::Success;
    }

    /// Whether the startup handshake is still outstanding.
    pub fn awaiting_startup_signal(&self) -> bool {
        self.gate.is_some()
    }

    /// Feed one byte from the serial port.
    pub fn feed<D: StripDriver>(
        &mut self,
        byte: u8,
        executor: &mut Executor<'_, D>,
        out: &mut impl ResponseSink,
    ) {
        if self.gate.is_some() {
            self.feed_gate(byte);
            return;
        }

        match self.state {
            State::Start => self.feed_start(byte, executor),
            State::TextArgs => self.feed_text_args(byte, executor, out),
            State::BinLen1 => {
                self.frame_len = u16::from(byte) << 8;
                self.state = State::BinLen2;
            }
            State::BinLen2 => {
                self.frame_len |= u16::from(byte);
                self.remaining = self.frame_len;
                if self.remaining == 0 {
                    // An empty frame still finishes the command; bailing
                    // out here would leave the store suspended
                    self.finish(executor, out);
                    self.state = State::Start;
                } else {
                    self.state = State::BinData;
                }
            }
            State::BinData => self.feed_binary_data(byte, executor, out),
            State::NoArgs => {
                if is_newline(byte) {
                    self.finish(executor, out);
                    self.state = State::Start;
                } else {
                    self.trap(executor);
                }
            }
            State::IgnoredArgs => {
                if is_newline(byte) {
                    self.finish(executor, out);
                    self.state = State::Start;
                }
            }
            State::Trap => {
                if is_newline(byte) {
                    out.write_str("-E");
                    out.write_dec(ErrorCode::SerialProtocolParseError as u32);
                    out.write_byte(b'\n');
                    self.reset();
                }
            }
        }
    }

    fn feed_gate(&mut self, byte: u8) {
        let Some(matched) = self.gate else {
            return;
        };
        if matched == READY_SIGNAL.len() {
            if is_newline(byte) {
                self.gate = None;
                #[cfg(feature = "log")]
                println!("startup signal received");
                return;
            }
        } else if byte == READY_SIGNAL[matched] {
            self.gate = Some(matched + 1);
            return;
        }
        // Mismatch: restart, counting a '?' as a fresh first byte
        self.gate = Some(usize::from(byte == READY_SIGNAL[0]));
    }

    fn feed_start<D: StripDriver>(&mut self, byte: u8, executor: &mut Executor<'_, D>) {
        if is_newline(byte) {
            return;
        }
        let Some(command) = Command::from_byte(byte) else {
            self.state = State::Trap;
            return;
        };
        self.command = Some(command);
        self.current_arg = None;
        self.error = ErrorCode::Success;
        if command.writes_bytecode() {
            // Halt execution over the incoming program and feed the
            // executor NOPs until the upload completes
            executor.rewind();
            executor.store_mut().suspend();
        }
        self.state = if command == Command::Query {
            State::IgnoredArgs
        } else if command.takes_binary_frame() {
            State::BinLen1
        } else if command.takes_text_args() {
            State::TextArgs
        } else {
            State::NoArgs
        };
    }

    fn feed_text_args<D: StripDriver>(
        &mut self,
        byte: u8,
        executor: &mut Executor<'_, D>,
        out: &mut impl ResponseSink,
    ) {
        if is_newline(byte) {
            self.flush_text_arg(executor);
            self.finish(executor, out);
            self.state = State::Start;
        } else if is_separator(byte) {
            self.flush_text_arg(executor);
        } else if let Some(digit) = hex_digit(byte) {
            let high = self.current_arg.unwrap_or(0);
            self.current_arg = Some((high << 4) | digit);
        } else {
            self.trap(executor);
        }
    }

    fn feed_binary_data<D: StripDriver>(
        &mut self,
        byte: u8,
        executor: &mut Executor<'_, D>,
        out: &mut impl ResponseSink,
    ) {
        self.handle_argument(byte, executor);
        self.remaining -= 1;
        if self.remaining == 0 {
            self.finish(executor, out);
            self.state = State::Start;
            return;
        }
        let written = self.frame_len - self.remaining;
        if written % PROGRESS_CHUNK == 0 {
            out.write_byte(b':');
            out.write_dec(u32::from(written));
            out.write_byte(b'\n');
        }
    }

    fn flush_text_arg<D: StripDriver>(&mut self, executor: &mut Executor<'_, D>) {
        if let Some(value) = self.current_arg.take() {
            self.handle_argument(value, executor);
        }
    }

    fn handle_argument<D: StripDriver>(&mut self, value: u8, executor: &mut Executor<'_, D>) {
        let Some(command) = self.command else {
            return;
        };
        if command.writes_bytecode() && !executor.store_mut().write(value) {
            self.error = ErrorCode::OperationNotSupported;
        }
    }

    /// Leave for the trap state, releasing any suspension this command put
    /// on the store.
    fn trap<D: StripDriver>(&mut self, executor: &mut Executor<'_, D>) {
        if let Some(command) = self.command.take() {
            if command.writes_bytecode() {
                executor.store_mut().resume();
            }
        }
        self.state = State::Trap;
    }

    fn finish<D: StripDriver>(&mut self, executor: &mut Executor<'_, D>, out: &mut impl ResponseSink) {
        let Some(command) = self.command.take() else {
            return;
        };
        #[cfg(feature = "log")]
        println!("serial command {:?} finished", command);

        let mut suppress_ok = false;
        match command {
            Command::Rewind => executor.rewind(),
            Command::Terminate => executor.stop(),
            Command::Suspend => executor.store_mut().suspend(),
            Command::Resume => {
                if executor.store().suspended() {
                    executor.store_mut().resume();
                } else {
                    self.error = ErrorCode::OperationNotSupported;
                }
            }
            Command::Capacity => {
                out.write_byte(b'+');
                out.write_dec(executor.store().capacity() as u32);
                out.write_byte(b'\n');
                suppress_ok = true;
            }
            Command::Version => {
                out.write_byte(b'+');
                out.write_str(env!("CARGO_PKG_VERSION"));
                out.write_byte(b'\n');
                suppress_ok = true;
            }
            Command::Query => {
                out.write_str("+READY.\n");
                suppress_ok = true;
            }
            Command::Upload | Command::UploadBin | Command::Execute | Command::ExecuteBin => {
                if command.appends_end() && !executor.store_mut().write(Opcode::End as u8) {
                    self.error = ErrorCode::OperationNotSupported;
                }
                executor.rewind();
                executor.store_mut().resume();
            }
        }

        if self.error.is_success() {
            if !suppress_ok {
                out.write_str("+OK\n");
            }
        } else {
            out.write_str("-E");
            out.write_dec(self.error as u32);
            out.write_byte(b'\n');
        }
        self.error = ErrorCode::Success;
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}
