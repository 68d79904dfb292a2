pub mod core;
pub mod filing;
pub mod pipeline;
pub mod tagging;
pub mod utils;

// Re-exports
pub use core::config::AutotagConfig;
pub use core::types::RunSummary;
pub use pipeline::{AnnotatedFiling, Annotator};
