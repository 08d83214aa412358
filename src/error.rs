use std::fmt;
use std::path::PathBuf;

/// Error taxonomy for the mapped-area substrate (attach/swap/convert).
#[derive(Debug, Clone)]
pub enum AreaError {
    Attach(PathBuf, String),
    IdFileLocked(PathBuf),
    GenerationRace { expected: u32, found: u32 },
    DiskFull(PathBuf),
    VersionMismatch { area: &'static str, on_disk: u8, compiled: u8 },
    NoConverter { area: &'static str, from: u8, to: u8 },
    TypesizeMismatch(String),
    Corrupt(PathBuf, String),
}

impl fmt::Display for AreaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AreaError::*;
        match self {
            Attach(p, msg) => write!(f, "failed to attach {}: {}", p.display(), msg),
            IdFileLocked(p) => write!(f, "id file {} held by another writer", p.display()),
            GenerationRace { expected, found } => write!(
                f,
                "generation race: attached at {expected}, id file now at {found}; rescan required"
            ),
            DiskFull(p) => write!(f, "disk full while growing {}", p.display()),
            VersionMismatch { area, on_disk, compiled } => write!(
                f,
                "{area} on-disk version {on_disk} does not match compiled version {compiled}"
            ),
            NoConverter { area, from, to } => {
                write!(f, "no converter registered for {area} from version {from} to {to}")
            }
            TypesizeMismatch(detail) => write!(f, "typesize profile mismatch: {detail}"),
            Corrupt(p, msg) => write!(f, "corrupt area file {}: {}", p.display(), msg),
        }
    }
}

impl std::error::Error for AreaError {}

/// Error taxonomy for the input scanner and staging pipeline (C5).
#[derive(Debug, Clone)]
pub enum ScanError {
    Stat(PathBuf, String),
    Stage(PathBuf, String),
    DiskFull(PathBuf),
    LinkMaxExceeded(PathBuf),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ScanError::*;
        match self {
            Stat(p, msg) => write!(f, "stat failed for {}: {}", p.display(), msg),
            Stage(p, msg) => write!(f, "staging failed for {}: {}", p.display(), msg),
            DiskFull(p) => write!(f, "disk full while staging into {}", p.display()),
            LinkMaxExceeded(p) => write!(f, "link count exhausted under {}", p.display()),
        }
    }
}

impl std::error::Error for ScanError {}

/// Error taxonomy for the output queue, message cache and worker transfers (C6).
#[derive(Debug, Clone)]
pub enum TransferError {
    NoSlotAvailable(String),
    MessageMissing(u32),
    MessageCorrupt(u32, String),
    RecreateFailed(u32),
    AppendIo(String),
    PeerTimeout(String),
    PeerRefused(String),
    PeerProtocol(String),
    JobCleanupFailed(String),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TransferError::*;
        match self {
            NoSlotAvailable(host) => write!(f, "no free transfer slot for host {host}"),
            MessageMissing(jid) => write!(f, "message file missing for job {jid:08x}"),
            MessageCorrupt(jid, msg) => write!(f, "message file corrupt for job {jid:08x}: {msg}"),
            RecreateFailed(jid) => write!(f, "could not recreate message for job {jid:08x}"),
            AppendIo(msg) => write!(f, "append-restart log update failed: {msg}"),
            PeerTimeout(host) => write!(f, "peer timeout: {host}"),
            PeerRefused(host) => write!(f, "peer refused connection: {host}"),
            PeerProtocol(detail) => write!(f, "peer protocol error: {detail}"),
            JobCleanupFailed(detail) => write!(f, "job cleanup failed: {detail}"),
        }
    }
}

impl std::error::Error for TransferError {}

impl TransferError {
    /// Whether a failure occurring before any bytes moved should be retried.
    pub fn is_retriable_pre_transfer(&self) -> bool {
        use TransferError::*;
        matches!(self, NoSlotAvailable(_) | PeerTimeout(_) | PeerRefused(_))
    }

    /// Whether a failure occurring mid-transfer should be retried (as opposed
    /// to being a logical/validation failure that will recur identically).
    pub fn is_retriable_during_transfer(&self) -> bool {
        use TransferError::*;
        matches!(self, PeerTimeout(_) | PeerRefused(_) | PeerProtocol(_))
    }
}

/// Top-level error kinds surfaced by admin-tool commands and the CLI.
#[derive(Debug, Clone)]
pub enum CoreError {
    Configuration(String),
    ResourceExhaustion(String),
    PeerFailure(String),
    ConsistencyDrift(String),
    VersionMismatch(String),
    PermissionDenied(String),
    CorruptMessage(u32),
    Area(AreaError),
    Scan(ScanError),
    Transfer(TransferError),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CoreError::*;
        match self {
            Configuration(msg) => write!(f, "configuration error: {msg}"),
            ResourceExhaustion(msg) => write!(f, "resource exhaustion: {msg}"),
            PeerFailure(msg) => write!(f, "peer failure: {msg}"),
            ConsistencyDrift(msg) => write!(f, "consistency drift corrected: {msg}"),
            VersionMismatch(msg) => write!(f, "version mismatch: {msg}"),
            PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            CorruptMessage(jid) => write!(f, "corrupt message for job {jid:08x}, queue entry dropped"),
            Area(e) => write!(f, "{e}"),
            Scan(e) => write!(f, "{e}"),
            Transfer(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<AreaError> for CoreError {
    fn from(e: AreaError) -> Self {
        CoreError::Area(e)
    }
}

impl From<ScanError> for CoreError {
    fn from(e: ScanError) -> Self {
        CoreError::Scan(e)
    }
}

impl From<TransferError> for CoreError {
    fn from(e: TransferError) -> Self {
        CoreError::Transfer(e)
    }
}

/// Process exit codes for the admin CLI surface, mirroring the historical
/// tool convention of a small fixed set rather than arbitrary codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Incorrect,
    SyntaxError,
    NoAccess,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Incorrect => -1,
            ExitCode::SyntaxError => 1,
            ExitCode::NoAccess => 2,
        }
    }
}
