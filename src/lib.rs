//! thinking-server - branching business-state simulation
//!
//! A month-by-month explorer over possible futures of a business. Given a
//! seed textual description, it asks an action oracle for candidate moves,
//! fans the resulting (state, action) pairs out to a prediction oracle under
//! a bounded concurrent batch, prunes the growing set of futures to a beam,
//! and records every transition in a path-addressable state tree.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use thinking_server::{SimulationConfig, SimulationEngine};
//! use thinking_server::oracle::{StubActionOracle, StubPredictionOracle};
//!
//! let engine = SimulationEngine::new(
//!     Arc::new(StubActionOracle::new(["expand", "hire"])),
//!     Arc::new(StubPredictionOracle),
//!     SimulationConfig { month_length: 3, ..Default::default() },
//! );
//! let run = engine.run("a two-person espresso cart in Helsinki").await?;
//!
//! for state in run.final_states() {
//!     println!("{}", state.description);
//! }
//! let tree = run.snapshot(); // nested mapping rooted under "Initial_State"
//! ```
//!
//! # Architecture
//!
//! ```text
//! seed ──► SimulationEngine ──► ActionOracle      (sequential, per state)
//!               │
//!               ├──► PredictionOracle x N          (concurrent, bounded)
//!               │
//!               ├──► beam::select                  (prune to beam_width)
//!               └──► StateTree + path map          (single writer)
//! ```
//!
//! The oracles are capability traits: production wires them to a remote
//! chat-completion endpoint, tests use deterministic stubs.

pub mod beam;
pub mod error;
pub mod metrics;
pub mod oracle;
pub mod simulation;
pub mod tree;
pub mod types;

// Core engine
pub use simulation::SimulationEngine;
pub use types::{ActionPath, BusinessState, SimulationConfig, SimulationRun, StateId};

// Errors
pub use error::{OracleError, SimulationError, TreeError};

// Oracle capability surface
pub use oracle::{ActionOracle, CompletionClient, CompletionConfig, PredictionOracle};

// Leaves
pub use metrics::BusinessMetrics;
pub use tree::{StateTree, TreeNode, ROOT_LABEL};
