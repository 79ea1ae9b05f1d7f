//! Shared types and errors used across all Foldyx crates.

pub mod error;
pub mod chain;
pub mod options;

// Re-export commonly used types
pub use chain::{ChainEntry, MoleculeType};
pub use error::{FoldyxError, Result};
pub use options::{RunOptions, RunState, StructureFormat};
