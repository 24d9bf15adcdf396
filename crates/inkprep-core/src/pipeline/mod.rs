//! Directory-level pipeline: discovery, loading, step execution and output.
//!
//! - **discovery**: Find supported images directly inside a directory
//! - **validate**: Size and magic-byte checks before decoding
//! - **decode**: Load images with format detection and dimension limits
//! - **save**: Write final and intermediate images
//! - **runner**: Apply the planned steps and collect the report

pub mod decode;
pub mod discovery;
pub mod runner;
pub mod save;
pub mod validate;

pub use decode::{ImageLoader, LoadedImage};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use runner::{ImageEvent, ImageStatus, PipelineRunner, RunOutcome, OUTPUT_DIR};
pub use validate::FileCheck;
