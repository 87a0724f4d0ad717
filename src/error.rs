//! Error taxonomy for the simulation core.
//!
//! Oracle failures are branch-local: they are logged by the engine and the
//! affected branch is dropped, never the month or the run. Only invalid
//! configuration and tree-bookkeeping bugs surface to `run`'s caller.

use std::time::Duration;

use thiserror::Error;

/// A single action-generation or prediction call failed.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Transport-level failure reaching the completion endpoint.
    #[error("oracle request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not complete within the configured deadline.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status.
    #[error("oracle API error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// The response arrived but could not be turned into the expected shape.
    #[error("oracle response could not be parsed: {0}")]
    Parse(String),
}

/// Tree insertion went to an address that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// An intermediate path segment has no node. The source implementation
    /// fabricated a placeholder here; we treat it as a hard error because it
    /// can only mean the engine's path bookkeeping is wrong.
    #[error("no node under segment {segment:?} while walking path {path:?}")]
    MissingSegment { path: Vec<String>, segment: String },
}

/// Fatal errors surfaced by `SimulationEngine::run`.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Rejected before any oracle call is made.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}
