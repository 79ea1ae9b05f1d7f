//! HTTP handlers for all web routes.

pub mod layout;
pub mod editor;
pub mod run;
pub mod files;
pub mod system;
