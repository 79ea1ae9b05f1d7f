//! Foldyx Jobs - everything between the chain editor and the rendered results.
//!
//! 1. Editing the chain collection (add / delete / clear / presets)
//! 2. Building the YAML job description
//! 3. Preparing a run directory
//! 4. Running the prediction tool with a streamed, cancellable log
//! 5. Collecting the rank-0 structure and the confidence / affinity side files
//! 6. Formatting summaries

pub mod editor;
pub mod builder;
pub mod workspace;
pub mod runner;
pub mod artifacts;
pub mod summary;
pub mod gpu;
pub mod pipeline;

pub use foldyx_common::{FoldyxError, Result};
