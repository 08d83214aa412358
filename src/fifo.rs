//! Fifo command plane (C8), re-modeled as a typed channel per DESIGN.md's
//! Design Notes rather than literal named fifos. Grounded on the corpus's
//! one cross-thread communication primitive, `crossbeam_channel`, used
//! throughout `transfer.rs`/`transfer/workers/mod.rs` for worker metrics
//! and failure reporting.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

/// Single-byte commands on the original's named fifos, collapsed to one
/// enum since every fifo in §4.8 carries the same small vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Shutdown,
    ProcTerm,
    Ackn,
    Retry,
    ReRead,
    FlushMsgFifo,
    IsAlive,
    DeleteAll,
    HaltTransfer,
    StartTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ackn,
    ProcTerm,
}

/// In-process command channel: `fd_cmd_fifo`'s read/write pair realized
/// as a bounded `crossbeam_channel`, held open for the owner's lifetime.
pub struct CommandFifo {
    tx: Sender<Command>,
    rx: Receiver<Command>,
    resp_tx: Sender<Response>,
    resp_rx: Receiver<Response>,
}

impl CommandFifo {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let (resp_tx, resp_rx) = bounded(capacity.max(1));
        CommandFifo { tx, rx, resp_tx, resp_rx }
    }

    pub fn sender(&self) -> Sender<Command> {
        self.tx.clone()
    }

    pub fn response_sender(&self) -> Sender<Response> {
        self.resp_tx.clone()
    }

    /// Owner-side receive, used by a `run` loop's main `select`-equivalent.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Command> {
        match self.rx.recv_timeout(timeout) {
            Ok(cmd) => Some(cmd),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Caller-side: send a command then wait up to `timeout` for a
    /// response. A missing reply is the caller's concern (§4.8: "logged as
    /// warning, not fatal") — this just returns `None`.
    pub fn send_and_wait(&self, cmd: Command, timeout: Duration) -> Option<Response> {
        self.tx.send(cmd).ok()?;
        self.resp_rx.recv_timeout(timeout).ok()
    }

    pub fn reply(&self, resp: Response) {
        let _ = self.resp_tx.send(resp);
    }
}

/// `shutdown_mon`-style handshake: send `Shutdown`, wait up to `timeout`
/// for `ProcTerm`/`Ackn`; the caller is responsible for the "if no reply
/// arrives, invoke `check_mon(1s)`" fallback since that requires knowledge
/// of the specific process being shut down.
pub fn shutdown_with_timeout(fifo: &CommandFifo, timeout: Duration) -> bool {
    matches!(
        fifo.send_and_wait(Command::Shutdown, timeout),
        Some(Response::ProcTerm) | Some(Response::Ackn)
    )
}

/// Named-pipe framing for the cross-process path, feature-gated so tests
/// exercise only the in-process channel above by default. Each command
/// and response is a single ASCII byte, matching §4.8's "responses are
/// single-byte" framing.
#[cfg(feature = "unix-fifo")]
pub mod wire {
    use super::{Command, Response};
    use std::io::{Read, Write};

    impl Command {
        pub fn to_byte(self) -> u8 {
            match self {
                Command::Shutdown => b'S',
                Command::ProcTerm => b'T',
                Command::Ackn => b'A',
                Command::Retry => b'R',
                Command::ReRead => b'D',
                Command::FlushMsgFifo => b'F',
                Command::IsAlive => b'I',
                Command::DeleteAll => b'X',
                Command::HaltTransfer => b'H',
                Command::StartTransfer => b'G',
            }
        }

        pub fn from_byte(b: u8) -> Option<Self> {
            Some(match b {
                b'S' => Command::Shutdown,
                b'T' => Command::ProcTerm,
                b'A' => Command::Ackn,
                b'R' => Command::Retry,
                b'D' => Command::ReRead,
                b'F' => Command::FlushMsgFifo,
                b'I' => Command::IsAlive,
                b'X' => Command::DeleteAll,
                b'H' => Command::HaltTransfer,
                b'G' => Command::StartTransfer,
                _ => return None,
            })
        }
    }

    impl Response {
        pub fn to_byte(self) -> u8 {
            match self {
                Response::Ackn => b'A',
                Response::ProcTerm => b'T',
            }
        }
    }

    pub fn write_command<W: Write>(w: &mut W, cmd: Command) -> std::io::Result<()> {
        w.write_all(&[cmd.to_byte()])
    }

    pub fn read_command<R: Read>(r: &mut R) -> std::io::Result<Option<Command>> {
        let mut buf = [0u8; 1];
        r.read_exact(&mut buf)?;
        Ok(Command::from_byte(buf[0]))
    }
}
