//! Result reporter: persists the aggregate [`PipelineReport`] once per run.
//!
//! Two layouts are supported. `json` writes one document mapping file names
//! to their step results. `jsonl` writes one [`ImageRecord`] per line so a
//! large run can be streamed or grepped image by image.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::ReportConfig;
use crate::types::{ImageResult, PipelineReport};

/// Base name of the report file inside the output directory.
pub const REPORT_STEM: &str = "result";

/// Layout of the report file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Single JSON document
    Json,
    /// One image per line
    JsonLines,
}

impl ReportFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonLines => "jsonl",
        }
    }
}

/// One image's entry as a single-key object: `{"<file>": {<step>: ...}}`.
pub struct ImageRecord<'a> {
    pub file_name: &'a str,
    pub result: &'a ImageResult,
}

impl Serialize for ImageRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.file_name, self.result)?;
        map.end()
    }
}

/// Writes the run report in the configured format.
#[derive(Debug, Clone)]
pub struct ResultReporter {
    format: ReportFormat,
    pretty: bool,
}

impl ResultReporter {
    /// Create a reporter from report settings.
    ///
    /// Unknown formats fall back to JSON; [`crate::Config`] validation
    /// rejects them before a reporter is built from a loaded file.
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            format: ReportFormat::parse(&config.format).unwrap_or(ReportFormat::Json),
            pretty: config.pretty,
        }
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    /// Path the report will be written to inside `output_dir`.
    pub fn report_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{REPORT_STEM}.{}", self.format.extension()))
    }

    /// Serialize the report to `writer`.
    ///
    /// `pretty` only affects the JSON layout; JSONL lines stay compact.
    pub fn write_to<W: Write>(&self, report: &PipelineReport, mut writer: W) -> io::Result<()> {
        match self.format {
            ReportFormat::Json if self.pretty => {
                serde_json::to_writer_pretty(&mut writer, report).map_err(io::Error::other)?;
                writeln!(writer)?;
            }
            ReportFormat::Json => {
                serde_json::to_writer(&mut writer, report).map_err(io::Error::other)?;
                writeln!(writer)?;
            }
            ReportFormat::JsonLines => {
                for (file_name, result) in report.iter() {
                    let record = ImageRecord { file_name, result };
                    serde_json::to_writer(&mut writer, &record).map_err(io::Error::other)?;
                    writeln!(writer)?;
                }
            }
        }
        writer.flush()
    }

    /// Persist the report under `output_dir`.
    ///
    /// A failed write is logged and reported as `None`; the processing that
    /// produced the report is unaffected.
    pub fn persist(&self, report: &PipelineReport, output_dir: &Path) -> Option<PathBuf> {
        let path = self.report_path(output_dir);
        let written = File::create(&path).and_then(|file| self.write_to(report, BufWriter::new(file)));
        match written {
            Ok(()) => {
                tracing::info!("Report written to {:?} ({} image(s))", path, report.len());
                Some(path)
            }
            Err(e) => {
                tracing::error!("Failed to write report {:?}: {}", path, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepResult;

    fn sample_report() -> PipelineReport {
        let mut first = ImageResult::new();
        first.record(StepResult::success("grayscale").with_metric("channels", 1));
        first.record(StepResult::from_error("crop", "Crop size must be positive"));

        let mut second = ImageResult::new();
        second.record(StepResult::success("grayscale"));

        let mut report = PipelineReport::new();
        report.insert("a.png", first);
        report.insert("b.png", second);
        report
    }

    #[test]
    fn test_json_report_shape() {
        let reporter = ResultReporter::new(&ReportConfig::default());
        let mut buffer = Vec::new();
        reporter.write_to(&sample_report(), &mut buffer).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["a.png"]["grayscale"]["metrics"]["channels"], 1);
        assert_eq!(value["a.png"]["crop"]["status"], "failure");
        assert_eq!(
            value["a.png"]["crop"]["error"],
            "Crop size must be positive"
        );
    }

    #[test]
    fn test_pretty_json_spans_lines() {
        let reporter = ResultReporter::new(&ReportConfig {
            format: "json".into(),
            pretty: true,
        });
        let mut buffer = Vec::new();
        reporter.write_to(&sample_report(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.lines().count() > 2);
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
    }

    #[test]
    fn test_jsonl_report_has_one_line_per_image() {
        let reporter = ResultReporter::new(&ReportConfig {
            format: "jsonl".into(),
            pretty: true,
        });
        let mut buffer = Vec::new();
        reporter.write_to(&sample_report(), &mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.as_object().unwrap().len(), 1);
        assert_eq!(first["a.png"]["crop"]["status"], "failure");
    }

    #[test]
    fn test_image_record_keeps_step_order() {
        let report = sample_report();
        let result = report.get("a.png").unwrap();
        let record = ImageRecord {
            file_name: "a.png",
            result,
        };
        let json = serde_json::to_string(&record).unwrap();
        let grayscale = json.find("grayscale").unwrap();
        let crop = json.find("crop").unwrap();
        assert!(json.starts_with("{\"a.png\":"));
        assert!(grayscale < crop);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ReportFormat::parse("json"), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::parse("JSONL"), Some(ReportFormat::JsonLines));
        assert_eq!(ReportFormat::parse("yaml"), None);
        let reporter = ResultReporter::new(&ReportConfig {
            format: "ndjson".into(),
            pretty: false,
        });
        assert_eq!(reporter.format(), ReportFormat::JsonLines);
    }

    #[test]
    fn test_report_path_uses_format_extension() {
        let reporter = ResultReporter::new(&ReportConfig::default());
        assert_eq!(
            reporter.report_path(Path::new("out")),
            PathBuf::from("out/result.json")
        );
    }

    #[test]
    fn test_persist_failure_returns_none() {
        let reporter = ResultReporter::new(&ReportConfig::default());
        let missing = Path::new("/nonexistent/inkprep/output");
        assert!(reporter.persist(&sample_report(), missing).is_none());
    }

    #[test]
    fn test_persist_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = ResultReporter::new(&ReportConfig::default());
        let path = reporter.persist(&sample_report(), dir.path()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\"b.png\""));
    }
}
