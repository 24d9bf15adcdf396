//! Step registry: maps configured step names to their implementations.
//!
//! Each entry is a builder that turns a step's raw `params` table into a
//! typed, range-checked step. Builders run once per run when the pipeline is
//! planned; the resolved steps are then shared by every image.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::StepConfig;
use crate::error::ConfigError;
use crate::steps::{
    AdaptiveThreshold, Crop, Deskew, Dilate, Erode, GammaCorrection, GaussianBlur, Grayscale,
    HistEqualization, Invert, MedianBlur, MorphClose, MorphOpen, NlMeansDenoise, Normalization,
    RemoveSmallComponents, Resize, Sharpen, Skeletonize, Step, Threshold, Transform, Validate,
};

/// A name that could not be resolved at run time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("step not registered: {0}")]
    Unregistered(String),

    #[error("validator not registered: {0}")]
    NoValidator(String),
}

/// A step with typed parameters, ready to run.
#[derive(Clone)]
pub struct ResolvedStep {
    pub transform: Arc<dyn Transform>,
    /// `None` for transform-only plugins
    pub validator: Option<Arc<dyn Validate>>,
}

impl std::fmt::Debug for ResolvedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedStep")
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

/// One configured step after planning.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub name: String,
    pub enabled: bool,
    step: Option<ResolvedStep>,
}

impl PlannedStep {
    /// The resolved step, or why it cannot run.
    pub fn resolve(&self) -> Result<&ResolvedStep, RegistryError> {
        self.step
            .as_ref()
            .ok_or_else(|| RegistryError::Unregistered(self.name.clone()))
    }
}

type BuildFn = Box<dyn Fn(&toml::Table) -> Result<ResolvedStep, String> + Send + Sync>;

/// Name to builder lookup for transforms and their validators.
pub struct StepRegistry {
    entries: BTreeMap<String, BuildFn>,
}

impl StepRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in step.
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register::<Grayscale>();
        registry.register::<Threshold>();
        registry.register::<AdaptiveThreshold>();
        registry.register::<Deskew>();
        registry.register::<Resize>();
        registry.register::<Crop>();
        registry.register::<Dilate>();
        registry.register::<Erode>();
        registry.register::<MorphOpen>();
        registry.register::<MorphClose>();
        registry.register::<MedianBlur>();
        registry.register::<GaussianBlur>();
        registry.register::<NlMeansDenoise>();
        registry.register::<Normalization>();
        registry.register::<GammaCorrection>();
        registry.register::<Invert>();
        registry.register::<Sharpen>();
        registry.register::<Skeletonize>();
        registry.register::<RemoveSmallComponents>();
        registry.register::<HistEqualization>();
        registry
    }

    /// Register a step under [`Step::NAME`], replacing any previous entry.
    pub fn register<S: Step>(&mut self) {
        let build: BuildFn = Box::new(|params| {
            let step = Arc::new(parse_params::<S>(params)?);
            Ok(ResolvedStep {
                transform: step.clone(),
                validator: Some(step),
            })
        });
        self.entries.insert(S::NAME.to_string(), build);
    }

    /// Register a transform that has no validator.
    ///
    /// Images reaching it get a "validator not registered" failure after the
    /// transform runs.
    pub fn register_transform<T>(&mut self, name: impl Into<String>)
    where
        T: Transform + DeserializeOwned + 'static,
    {
        let build: BuildFn = Box::new(|params| {
            Ok(ResolvedStep {
                transform: Arc::new(parse_params::<T>(params)?),
                validator: None,
            })
        });
        self.entries.insert(name.into(), build);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Build one step from its params.
    pub fn resolve(&self, config: &StepConfig) -> Result<ResolvedStep, ConfigError> {
        let build = self
            .entries
            .get(&config.name)
            .ok_or_else(|| ConfigError::StepParams {
                step: config.name.clone(),
                message: RegistryError::Unregistered(config.name.clone()).to_string(),
            })?;
        build(&config.params).map_err(|message| ConfigError::StepParams {
            step: config.name.clone(),
            message,
        })
    }

    /// Plan a step list.
    ///
    /// Enabled, registered steps get typed params or a [`ConfigError`].
    /// Unknown names are kept unresolved with a warning so each image can
    /// record the failure. Disabled steps are not parsed.
    pub fn plan(&self, steps: &[StepConfig]) -> Result<Vec<PlannedStep>, ConfigError> {
        steps
            .iter()
            .map(|config| {
                let step = if !config.enabled {
                    None
                } else if self.contains(&config.name) {
                    Some(self.resolve(config)?)
                } else {
                    tracing::warn!(step = %config.name, "Step is not registered");
                    None
                };
                Ok(PlannedStep {
                    name: config.name.clone(),
                    enabled: config.enabled,
                    step,
                })
            })
            .collect()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_builtin_steps()
    }
}

fn parse_params<T>(params: &toml::Table) -> Result<T, String>
where
    T: Transform + DeserializeOwned,
{
    let step: T = toml::Value::Table(params.clone())
        .try_into()
        .map_err(|e: toml::de::Error| e.message().to_string())?;
    step.check().map_err(|e| e.to_string())?;
    Ok(step)
}
