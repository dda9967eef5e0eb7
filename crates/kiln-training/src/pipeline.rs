//! In-container training entry point.
//!
//! Stages inputs, resolves the model, materializes the config and runs the
//! trainer. All collaborators are injected so the sequence can run against a
//! temporary layout in tests.

use crate::config::{ConfigMaterializer, ConfigOverrides};
use crate::environment::ContainerEnvironment;
use crate::error::TrainingResult;
use crate::launch::{DeviceProbe, LaunchCommand, LaunchCommandBuilder, NvidiaSmi};
use crate::layout::ContainerLayout;
use crate::model::{ModelResolver, ResolvedModel};
use crate::runner::{ExecutionResult, JobRunner};
use crate::staging::{InputStager, StagedInputs};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub staged: StagedInputs,
    pub model: Option<ResolvedModel>,
    pub config_path: PathBuf,
    pub gpu_count: usize,
    pub command: LaunchCommand,
    pub execution: ExecutionResult,
}

pub struct TrainingPipeline {
    env: ContainerEnvironment,
    layout: ContainerLayout,
    stager: InputStager,
    resolver: ModelResolver,
    materializer: ConfigMaterializer,
    builder: LaunchCommandBuilder,
    probe: Box<dyn DeviceProbe>,
    runner: JobRunner,
}

impl std::fmt::Debug for TrainingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingPipeline")
            .field("layout", &self.layout)
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl TrainingPipeline {
    #[must_use]
    pub fn new(env: ContainerEnvironment, layout: ContainerLayout) -> Self {
        let runner = JobRunner::new().with_working_dir(layout.code_dir().to_path_buf());
        Self {
            env,
            layout,
            stager: InputStager::new(),
            resolver: ModelResolver::default(),
            materializer: ConfigMaterializer::new(),
            builder: LaunchCommandBuilder::new(),
            probe: Box::new(NvidiaSmi::default()),
            runner,
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn DeviceProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn with_launch_builder(mut self, builder: LaunchCommandBuilder) -> Self {
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn with_runner(mut self, runner: JobRunner) -> Self {
        self.runner = runner;
        self
    }

    pub async fn run(&self) -> TrainingResult<PipelineReport> {
        self.log_environment();

        let (train, test) = self.env.data_channels()?;
        info!(train = %train.display(), test = %test.display(), "Setting up data directory");
        self.layout.ensure_dirs()?;
        let staged = self.stager.stage(&train, &test, &self.layout.data_dir())?;

        let model = match self.env.model_channel() {
            Some(dir) => Some(self.resolver.resolve(&dir, &self.layout.model_extract_root())?),
            None => {
                info!("No model channel provided, keeping model_id_or_path from config");
                None
            }
        };

        let mut overrides = ConfigOverrides::new().run_dir(self.env.run_dir());
        if let Some(ref model) = model {
            overrides = overrides.model_id_or_path(model.path());
        }
        let config_path = self.materializer.materialize(&self.layout.config_path(), &overrides)?;

        let gpu_count = self.probe.gpu_count();
        let command = self.builder.build(gpu_count, &config_path);
        if command.is_distributed(self.builder.launcher()) {
            info!(gpus = gpu_count, "Using distributed launcher");
        } else {
            info!("No GPUs detected, using single-process execution");
        }

        let env: BTreeMap<String, String> =
            self.env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let execution = self.runner.run(&command, &env).await?;

        Ok(PipelineReport { staged, model, config_path, gpu_count, command, execution })
    }

    fn log_environment(&self) {
        info!(
            image_version = self.env.image_version().unwrap_or("unknown"),
            code_dir = %self.layout.code_dir().display(),
            "Training container started"
        );
        for (key, value) in self.env.iter() {
            debug!(key, value, "Environment variable");
        }
    }
}
