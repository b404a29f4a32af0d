use std::{error::Error, fmt, io};

use comms::{KeyErr, Phase};

/// The engine's result type.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Fatal engine failures. None of them is recoverable locally: the stage is
/// aborted and the matching exit code is reported to the host.
#[derive(Debug)]
pub enum EngineErr {
    /// Static configuration missing, unreadable or inconsistent.
    ConfigUnavailable(String),
    /// A buffer sized from configuration could not be allocated.
    MemoryUnavailable { what: &'static str, len: usize },
    /// A packet arrived while its phase queue was full.
    QueueFull { phase: Phase, capacity: usize },
    /// A packet whose phase or class matches no expected state.
    UnexpectedPacket { key: u32, phase: Phase, tick: u32 },
    /// The watchdog saw no tick progress for a whole period.
    Timeout {
        epoch: u32,
        example: u32,
        phase: Phase,
        tick: u32,
    },
}

impl EngineErr {
    /// Returns the exit code this failure is reported with.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            EngineErr::ConfigUnavailable(_) => ExitCode::ConfigUnavailable,
            EngineErr::MemoryUnavailable { .. } => ExitCode::MemoryUnavailable,
            EngineErr::QueueFull { .. } => ExitCode::QueueFull,
            EngineErr::UnexpectedPacket { .. } => ExitCode::UnexpectedPacket,
            EngineErr::Timeout { .. } => ExitCode::Timeout,
        }
    }
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErr::ConfigUnavailable(detail) => {
                write!(f, "core configuration failed: {detail}")
            }
            EngineErr::MemoryUnavailable { what, len } => {
                write!(f, "allocation of {len} entries for {what} failed")
            }
            EngineErr::QueueFull { phase, capacity } => {
                write!(f, "{phase:?} packet queue full ({capacity} packets)")
            }
            EngineErr::UnexpectedPacket { key, phase, tick } => write!(
                f,
                "unexpected packet 0x{key:08x} in {phase:?} phase at tick {tick}"
            ),
            EngineErr::Timeout {
                epoch,
                example,
                phase,
                tick,
            } => write!(
                f,
                "timeout (epoch:{epoch} example:{example} phase:{phase:?} tick:{tick})"
            ),
        }
    }
}

impl Error for EngineErr {}

impl From<serde_json::Error> for EngineErr {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigUnavailable(value.to_string())
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::ConfigUnavailable(value.to_string())
    }
}

impl From<KeyErr> for EngineErr {
    fn from(value: KeyErr) -> Self {
        Self::ConfigUnavailable(value.to_string())
    }
}

/// The single status a core reports to the host at stage end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    ConfigUnavailable,
    MemoryUnavailable,
    QueueFull,
    UnexpectedPacket,
    Timeout,
}

impl ExitCode {
    /// The numeric code put on the host channel.
    pub fn code(self) -> u32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::ConfigUnavailable => 1,
            ExitCode::MemoryUnavailable => 2,
            ExitCode::QueueFull => 3,
            ExitCode::UnexpectedPacket => 4,
            ExitCode::Timeout => 5,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ExitCode::Success => "stage OK",
            ExitCode::ConfigUnavailable => "core configuration failed",
            ExitCode::MemoryUnavailable => "memory allocation failed",
            ExitCode::QueueFull => "packet queue full",
            ExitCode::UnexpectedPacket => "unexpected packet received",
            ExitCode::Timeout => "timeout",
        };

        f.write_str(msg)
    }
}

impl<T> From<&Result<T>> for ExitCode {
    fn from(value: &Result<T>) -> Self {
        match value {
            Ok(_) => ExitCode::Success,
            Err(e) => e.exit_code(),
        }
    }
}
