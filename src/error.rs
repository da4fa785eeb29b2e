use thiserror::Error;

use crate::microcode::MicrocodeAddress;

/// Errors caused by malformed caller input.
///
/// Analysis itself never fails: imprecision is absorbed by conservative
/// approximation, and broken internal invariants panic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("parse error at offset {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("expecting an lvalue, got `{0}`")]
    NotAnLvalue(String),

    #[error("no microcode node at {0}")]
    UnknownNode(MicrocodeAddress),
}

pub type Result<T> = std::result::Result<T, Error>;
