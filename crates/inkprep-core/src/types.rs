//! Core data types for the inkprep preprocessing pipeline.
//!
//! These types represent the outcome of running images through the configured
//! steps: one [`StepResult`] per executed step, collected in execution order
//! into an [`ImageResult`], and one [`ImageResult`] per loaded file in the
//! [`PipelineReport`].

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Pass/fail status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Outcome of one step on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Name of the step as configured
    pub step: String,

    /// Whether the step's postcondition held
    pub status: StepStatus,

    /// Diagnostic metrics reported by the validator
    #[serde(default)]
    pub metrics: Map<String, Value>,

    /// Error text when the transform or validator raised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// A passing result with no metrics yet.
    pub fn success(step: impl Into<String>) -> Self {
        Self::with_status(step, StepStatus::Success)
    }

    /// A failing result with no metrics yet.
    pub fn failure(step: impl Into<String>) -> Self {
        Self::with_status(step, StepStatus::Failure)
    }

    /// Success when `passed`, failure otherwise.
    pub fn check(step: impl Into<String>, passed: bool) -> Self {
        if passed {
            Self::success(step)
        } else {
            Self::failure(step)
        }
    }

    /// A failing result carrying an error message.
    pub fn from_error(step: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut result = Self::failure(step);
        result.error = Some(error.to_string());
        result
    }

    fn with_status(step: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step: step.into(),
            status,
            metrics: Map::new(),
            error: None,
        }
    }

    /// Attach a metric, replacing any previous value under the same key.
    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Per-image outcomes, kept in step execution order.
///
/// Serialized as a map from step name to [`StepResult`]. A step name that
/// appears twice keeps its first position and its latest outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageResult {
    steps: Vec<StepResult>,
}

impl ImageResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a step.
    pub fn record(&mut self, result: StepResult) {
        match self.steps.iter_mut().find(|r| r.step == result.step) {
            Some(existing) => *existing = result,
            None => self.steps.push(result),
        }
    }

    /// Look up a step's outcome by name.
    pub fn get(&self, step: &str) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|r| r.step.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps that ended in failure.
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|r| !r.is_success()).count()
    }
}

impl Serialize for ImageResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.steps.len()))?;
        for result in &self.steps {
            map.serialize_entry(&result.step, result)?;
        }
        map.end()
    }
}

/// Aggregate report: file name to that file's step outcomes.
///
/// Files that failed to load never appear here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PipelineReport {
    images: BTreeMap<String, ImageResult>,
}

impl PipelineReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, result: ImageResult) {
        self.images.insert(file_name.into(), result);
    }

    pub fn get(&self, file_name: &str) -> Option<&ImageResult> {
        self.images.get(file_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImageResult)> {
        self.images.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Statistics for a finished run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Files matching the supported extensions
    pub discovered: usize,

    /// Files loaded and run through the steps
    pub processed: usize,

    /// Files that failed to load
    pub skipped: usize,

    /// Step outcomes with status "success"
    pub steps_succeeded: usize,

    /// Step outcomes with status "failure"
    pub steps_failed: usize,

    /// Where the report was written, if the write succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,

    /// Wall-clock duration of the run
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_result_serializes_without_error_field() {
        let result = StepResult::success("grayscale").with_metric("channels", 1);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["step"], "grayscale");
        assert_eq!(json["status"], "success");
        assert_eq!(json["metrics"]["channels"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_step_result_from_error() {
        let result = StepResult::from_error("crop", "Crop size must be positive");
        assert_eq!(result.status, StepStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("Crop size must be positive"));
    }

    #[test]
    fn test_image_result_keeps_execution_order() {
        let mut result = ImageResult::new();
        result.record(StepResult::success("threshold"));
        result.record(StepResult::success("deskew"));
        result.record(StepResult::failure("crop"));

        let json = serde_json::to_string(&result).unwrap();
        let threshold = json.find("threshold").unwrap();
        let deskew = json.find("deskew").unwrap();
        let crop = json.find("crop").unwrap();
        assert!(threshold < deskew && deskew < crop);
        assert_eq!(result.failures(), 1);
    }

    #[test]
    fn test_image_result_repeated_step_replaces_in_place() {
        let mut result = ImageResult::new();
        result.record(StepResult::success("dilate"));
        result.record(StepResult::success("erode"));
        result.record(StepResult::failure("dilate"));

        let names: Vec<&str> = result.step_names().collect();
        assert_eq!(names, vec!["dilate", "erode"]);
        assert!(!result.get("dilate").unwrap().is_success());
    }

    #[test]
    fn test_report_serializes_as_filename_map() {
        let mut image = ImageResult::new();
        image.record(StepResult::success("grayscale"));
        let mut report = PipelineReport::new();
        report.insert("page.png", image);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["page.png"]["grayscale"]["status"], "success");
    }
}
