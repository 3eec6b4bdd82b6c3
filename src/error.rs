use std::{error::Error, fmt, io};

/// The loop module's result type.
pub type Result<T> = std::result::Result<T, LoopErr>;

/// Loop configuration and runtime failures.
#[derive(Debug)]
pub enum LoopErr {
    /// None of `max_epochs`, `max_steps` or `max_seconds` was given.
    NoStoppingCondition,
    /// Both `max_epochs` and `max_steps` were given.
    ConflictingBounds { max_epochs: usize, max_steps: usize },
    /// A stopping bound is out of range (zero epochs/steps, non-positive seconds).
    InvalidBound { what: &'static str, detail: String },
    /// The declared source length is zero.
    InvalidLength,
    /// A no-length iteration strategy name that isn't recognized.
    UnknownStrategy(String),
    /// A trigger was configured with an out of range value.
    InvalidTrigger { what: &'static str, detail: String },
    /// The source produced a different number of batches than its declared length.
    LengthMismatch {
        epoch: usize,
        expected: usize,
        got: usize,
    },
    /// A traversal of a source of unknown length produced no batches.
    EmptyEpoch { epoch: usize },
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for LoopErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopErr::NoStoppingCondition => write!(
                f,
                "no stopping condition: one of max_epochs, max_steps or max_seconds is required"
            ),
            LoopErr::ConflictingBounds {
                max_epochs,
                max_steps,
            } => write!(
                f,
                "only one of max_epochs and max_steps may be set, got max_epochs={max_epochs} max_steps={max_steps}"
            ),
            LoopErr::InvalidBound { what, detail } => write!(f, "invalid {what}: {detail}"),
            LoopErr::InvalidLength => write!(f, "dataloader length must be greater than 0"),
            LoopErr::UnknownStrategy(name) => {
                write!(f, "unknown no-length iteration strategy: {name}")
            }
            LoopErr::InvalidTrigger { what, detail } => {
                write!(f, "invalid trigger {what}: {detail}")
            }
            LoopErr::LengthMismatch {
                epoch,
                expected,
                got,
            } => write!(
                f,
                "dataloader length mismatch at epoch {epoch}: declared {expected}, got {got}"
            ),
            LoopErr::EmptyEpoch { epoch } => {
                write!(f, "dataloader produced no batches at epoch {epoch}")
            }
            LoopErr::Io(e) => write!(f, "io error: {e}"),
            LoopErr::Json(e) => write!(f, "invalid loop config: {e}"),
        }
    }
}

impl Error for LoopErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoopErr::Io(e) => Some(e),
            LoopErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LoopErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for LoopErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
