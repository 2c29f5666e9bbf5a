//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Module definition file could not be loaded or is inconsistent.
    #[error("invalid module definition: {0}")]
    Module(String),

    /// JavaScript source failed to parse.
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// The compile or link stage was started without a precompilation file.
    #[error("precompilation file {0} not found; please run precompile first")]
    MissingPrecompilation(PathBuf),

    /// A permutation index outside `0..count` was requested.
    #[error("invalid permutation id {id}; valid range is 0..{count}")]
    InvalidPermId { id: usize, count: usize },

    /// Link found fewer permutation files than permutations.
    #[error("missing permutation file {0}")]
    MissingPermutationFile(PathBuf),

    /// One or more permutations failed to compile; details were logged at
    /// the permutation boundary.
    #[error("{failed} of {total} permutations failed to compile")]
    Compile { failed: usize, total: usize },

    /// Link-stage configuration or artifact failure.
    #[error("link failed: {0}")]
    Link(String),

    /// `$getProperty` named a property the permutation has no value for.
    #[error("no binding for property {0}")]
    UnboundProperty(String),

    /// `$rebind` request with no applicable rebind rule.
    #[error("no rebind rule answers request {0}")]
    UnknownRebind(String),

    /// Malformed use of a compiler intrinsic in module source.
    #[error("invalid intrinsic use: {0}")]
    Intrinsic(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("precompilation serialization failed: {0}")]
    Serialize(#[from] bincode::Error),
}
