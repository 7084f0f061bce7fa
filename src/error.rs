use std::fmt;
use std::io;
use thiserror::Error;

/// Which of the three footer checksums failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChecksumKind {
    Source,
    Target,
    Patch,
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumKind::Source => write!(f, "source"),
            ChecksumKind::Target => write!(f, "target"),
            ChecksumKind::Patch => write!(f, "patch"),
        }
    }
}

/// Errors raised while reading or applying a BPS patch.
///
/// Every variant is terminal for the current application attempt. Bytes
/// already written to the target before the failure stay written.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not a valid bps patch")]
    Format,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown bps command: {0}")]
    UnknownCommand(u64),
    #[error("patch session already failed")]
    Halted,
    #[error("unexpected source size (expected: `{expected}`, got: `{actual}`)")]
    SourceSizeMismatch { expected: u64, actual: u64 },
    #[error("unexpected target size (expected: `{expected}`, got: `{actual}`)")]
    TargetSizeMismatch { expected: u64, actual: u64 },
    #[error("{kind} checksum mismatch (expected: `{expected:#010x}`, got: `{actual:#010x}`)")]
    Checksum {
        kind: ChecksumKind,
        expected: u32,
        actual: u32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
