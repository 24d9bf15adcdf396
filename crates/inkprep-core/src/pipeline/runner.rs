//! Runs the planned steps over every image in a directory.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use image::DynamicImage;

use super::decode::ImageLoader;
use super::discovery::{DiscoveredFile, FileDiscovery};
use super::save::{write_image, write_intermediate};
use crate::config::Config;
use crate::error::{PipelineError, Result, StepError, StepOutcome};
use crate::registry::{PlannedStep, RegistryError, StepRegistry};
use crate::report::ResultReporter;
use crate::types::{ImageResult, PipelineReport, RunSummary, StepResult};

/// Name of the directory, inside the input directory, that receives outputs.
pub const OUTPUT_DIR: &str = "output";

/// Progress notification, sent once per discovered file.
#[derive(Debug, Clone)]
pub struct ImageEvent<'a> {
    /// 1-based position in processing order
    pub index: usize,
    pub total: usize,
    pub file_name: &'a str,
    pub status: ImageStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// Ran through the steps; `failures` of them ended in failure
    Processed { failures: usize },
    /// Could not be loaded
    Skipped,
}

/// Report and statistics of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: PipelineReport,
    pub summary: RunSummary,
}

/// Applies a configured step list to every image in a directory.
pub struct PipelineRunner {
    config: Config,
    registry: StepRegistry,
}

impl PipelineRunner {
    /// A runner using the built-in steps.
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, StepRegistry::with_builtin_steps())
    }

    /// A runner using a custom registry.
    pub fn with_registry(config: Config, registry: StepRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Process `input_dir` without progress reporting.
    pub fn run(&self, input_dir: &Path) -> Result<RunOutcome> {
        self.run_with_progress(input_dir, |_| {})
    }

    /// Process `input_dir`, calling `on_image` after each file.
    ///
    /// Fails before touching any image when the directory is unusable or a
    /// step's params are invalid. Per-image problems never abort the run.
    pub fn run_with_progress<F>(&self, input_dir: &Path, mut on_image: F) -> Result<RunOutcome>
    where
        F: FnMut(&ImageEvent<'_>),
    {
        let start = Instant::now();
        if !input_dir.is_dir() {
            return Err(PipelineError::InputDir {
                path: input_dir.to_path_buf(),
                message: "not a directory".to_string(),
            }
            .into());
        }

        let plan = self.registry.plan(&self.config.steps)?;
        let files = FileDiscovery::new(self.config.processing.clone()).discover(input_dir);
        tracing::info!(
            dir = %input_dir.display(),
            files = files.len(),
            steps = plan.iter().filter(|s| s.enabled).count(),
            "Starting pipeline"
        );

        let output_dir = input_dir.join(OUTPUT_DIR);
        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            tracing::error!(dir = %output_dir.display(), "Cannot create output directory: {e}");
        }

        let loader = ImageLoader::new(self.config.limits.clone());
        let mut report = PipelineReport::new();
        let mut summary = RunSummary {
            discovered: files.len(),
            ..RunSummary::default()
        };

        for (i, file) in files.iter().enumerate() {
            let status = match loader.load(&file.path) {
                Ok(loaded) => {
                    let result = self.process_file(file, loaded.image, &plan, &output_dir);
                    let failures = result.failures();
                    summary.processed += 1;
                    summary.steps_failed += failures;
                    summary.steps_succeeded += result.len() - failures;
                    report.insert(file.file_name.clone(), result);
                    ImageStatus::Processed { failures }
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", file.file_name);
                    summary.skipped += 1;
                    ImageStatus::Skipped
                }
            };
            on_image(&ImageEvent {
                index: i + 1,
                total: files.len(),
                file_name: &file.file_name,
                status,
            });
        }

        summary.report_path = ResultReporter::new(&self.config.report).persist(&report, &output_dir);
        summary.elapsed = start.elapsed();
        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Pipeline finished"
        );
        Ok(RunOutcome { report, summary })
    }

    /// Run the steps on one loaded file and write its output image.
    fn process_file(
        &self,
        file: &DiscoveredFile,
        image: DynamicImage,
        plan: &[PlannedStep],
        output_dir: &Path,
    ) -> ImageResult {
        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.file_name.clone());
        let intermediate_dir = self.config.save_intermediate.then_some(output_dir);

        let (result, output) = self.apply_steps(image, plan, |step, image| {
            if let Some(dir) = intermediate_dir {
                if let Err(e) = write_intermediate(image, dir, &stem, step) {
                    tracing::error!("{e}");
                }
            }
        });

        let destination = output_dir.join(&file.file_name);
        let written = match output {
            Some(image) => write_image(&image, &destination),
            None => std::fs::copy(&file.path, &destination)
                .map(|_| ())
                .map_err(|e| PipelineError::Write {
                    path: destination.clone(),
                    message: e.to_string(),
                }),
        };
        match written {
            Ok(()) => tracing::debug!(path = %destination.display(), "Wrote output"),
            Err(e) => tracing::error!("{e}"),
        }
        result
    }

    /// Thread `image` through the enabled steps.
    ///
    /// Returns the per-step outcomes and the last adopted output, or `None`
    /// when no step produced one. `on_adopted` sees each adopted output.
    pub fn apply_steps<F>(
        &self,
        image: DynamicImage,
        plan: &[PlannedStep],
        mut on_adopted: F,
    ) -> (ImageResult, Option<DynamicImage>)
    where
        F: FnMut(&str, &DynamicImage),
    {
        let mut result = ImageResult::new();
        let mut current = image;
        let mut adopted = false;

        for planned in plan {
            let name = planned.name.as_str();
            if !planned.enabled {
                tracing::debug!(step = name, "Step disabled, skipping");
                continue;
            }

            let step = match planned.resolve() {
                Ok(step) => step,
                Err(e) => {
                    tracing::warn!(step = name, "{e}");
                    result.record(StepResult::from_error(name, e));
                    break;
                }
            };

            let started = Instant::now();
            let transformed = match guarded(|| step.transform.transform(&current)) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(step = name, "Transform failed: {e}");
                    result.record(StepResult::from_error(name, e));
                    break;
                }
            };
            tracing::trace!(
                step = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Transform done"
            );

            let Some(validator) = &step.validator else {
                let e = RegistryError::NoValidator(name.to_string());
                tracing::warn!(step = name, "{e}");
                result.record(StepResult::from_error(name, e));
                break;
            };

            let mut outcome = match guarded(|| validator.validate(&current, &transformed)) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(step = name, "Validation raised: {e}");
                    StepResult::from_error(name, e)
                }
            };
            outcome.step = name.to_string();
            if !outcome.is_success() {
                tracing::debug!(step = name, metrics = ?outcome.metrics, "Validation failed");
            }
            result.record(outcome);

            current = transformed.image;
            adopted = true;
            on_adopted(name, &current);
        }

        (result, adopted.then_some(current))
    }
}

/// Run one step call, turning a panic into a [`StepError::Panicked`].
fn guarded<T>(call: impl FnOnce() -> StepOutcome<T>) -> StepOutcome<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(StepError::Panicked(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
