use thiserror::Error;

use crate::modules::operand::{Label, Name};

/// Structural errors reported by module validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("function has no entry block")]
    MissingEntryBlock,

    #[error("SSA name %{duplicate} is defined more than once")]
    DuplicateSsaName { duplicate: Name },

    #[error("SSA name %{undefined} is used but never defined")]
    UndefinedSsaName { undefined: Name },

    #[error("terminator jumps to unknown block {target}")]
    UnknownJumpTarget { target: Label },
}

pub type Result<T> = std::result::Result<T, Error>;
