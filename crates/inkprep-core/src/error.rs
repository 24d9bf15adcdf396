//! Error types for the inkprep preprocessing pipeline.
//!
//! Errors are organized by stage: configuration problems surface before a run
//! starts, pipeline errors describe why an input file could not be loaded, and
//! step errors describe why a single transform failed on a single image.

use image::ColorType;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for inkprep operations.
#[derive(Error, Debug)]
pub enum InkprepError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A step's params table could not be turned into its typed parameters
    #[error("Invalid params for step '{step}': {message}")]
    StepParams { step: String, message: String },
}

/// Errors raised while discovering or loading input images.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// An output image could not be written
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// The input directory is missing or not a directory
    #[error("Input directory not usable: {path} ({message})")]
    InputDir { path: PathBuf, message: String },
}

/// Failure of a single step's transform or validator on a single image.
#[derive(Error, Debug)]
pub enum StepError {
    /// The image has zero width or height
    #[error("Input image is empty")]
    EmptyImage,

    /// A numeric parameter is outside its accepted range
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParam { param: &'static str, reason: String },

    /// The step cannot handle this pixel layout or sample type
    #[error("Unsupported pixel type {color:?}: {reason}")]
    UnsupportedPixelType {
        color: ColorType,
        reason: &'static str,
    },

    /// An iterative algorithm hit its hard ceiling
    #[error("Exceeded maximum of {limit} iterations")]
    IterationLimit { limit: usize },

    /// Error bubbled up from the image crate
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The step panicked; the payload message is kept
    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Shorthand for [`StepError::InvalidParam`].
    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            param,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for inkprep results.
pub type Result<T> = std::result::Result<T, InkprepError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Convenience type alias for step results.
pub type StepOutcome<T> = std::result::Result<T, StepError>;
