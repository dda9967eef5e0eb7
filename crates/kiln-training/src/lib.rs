//! Kiln Training
//!
//! In-container side of a fine-tuning job:
//! - Staging train/eval records into a canonical layout (`InputStager`)
//! - Safely unpacking model artifacts (`ArchiveExtractor`)
//! - Materializing the trainer config (`ConfigMaterializer`)
//! - Building and running the launch command (`LaunchCommandBuilder`, `JobRunner`)
//! - Wiring it all together (`TrainingPipeline`)

pub mod archive;
pub mod config;
pub mod digest;
pub mod environment;
pub mod error;
pub mod launch;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod runner;
pub mod staging;

pub use archive::{ArchiveExtractor, ArchiveFormat, ExtractionResult, ExtractionStrategy};
pub use config::{ConfigMaterializer, ConfigOverrides, TrainingConfig, REQUIRED_KEYS};
pub use environment::{channel_env_var, ContainerEnvironment, CHANNEL_MODEL, CHANNEL_TEST, CHANNEL_TRAIN};
pub use error::{TrainingError, TrainingResult};
pub use launch::{DeviceProbe, FixedDeviceProbe, LaunchCommand, LaunchCommandBuilder, NvidiaSmi};
pub use layout::ContainerLayout;
pub use model::{ModelResolver, ResolvedModel};
pub use pipeline::{PipelineReport, TrainingPipeline};
pub use runner::{ExecutionResult, JobRunner};
pub use staging::{InputStager, StagedInputs, RECORD_EXTENSION};
