//! Inkprep Core - configurable image preprocessing for OCR.
//!
//! A run applies an ordered list of named steps to every image in a
//! directory. Each step pairs a transform with a validator that checks the
//! transform's postcondition; outcomes are collected per image and written
//! as a single report next to the processed images.
//!
//! ```text
//! Config → plan steps → discover → load → transform/validate... → write → report
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use inkprep_core::{Config, PipelineRunner};
//!
//! fn main() -> inkprep_core::Result<()> {
//!     let config = Config::load()?;
//!     let outcome = PipelineRunner::new(config).run("./scans".as_ref())?;
//!     println!("processed {} images", outcome.summary.processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod steps;
pub mod types;

pub use config::{Config, StepConfig};
pub use error::{ConfigError, InkprepError, PipelineError, PipelineResult, Result, StepError};
pub use pipeline::{ImageEvent, ImageStatus, PipelineRunner, RunOutcome};
pub use registry::{PlannedStep, RegistryError, ResolvedStep, StepRegistry};
pub use report::{ImageRecord, ReportFormat, ResultReporter};
pub use steps::{Derived, Step, Transform, Transformed, Validate};
pub use types::{ImageResult, PipelineReport, RunSummary, StepResult, StepStatus};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
