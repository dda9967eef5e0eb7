//! Launch command construction and GPU detection.

use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::info;

/// Program plus ordered arguments. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
}

impl LaunchCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argv, program first.
    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)).collect()
    }

    /// Whether this runs under the distributed launcher.
    #[must_use]
    pub fn is_distributed(&self, launcher: &str) -> bool {
        self.program == launcher
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

/// Builds the trainer invocation for the available GPU count.
#[derive(Debug, Clone)]
pub struct LaunchCommandBuilder {
    python: String,
    launcher: String,
    entry_module: String,
}

impl Default for LaunchCommandBuilder {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            launcher: "torchrun".to_string(),
            entry_module: "mistral_finetune.train".to_string(),
        }
    }
}

impl LaunchCommandBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = launcher.into();
        self
    }

    #[must_use]
    pub fn with_entry_module(mut self, module: impl Into<String>) -> Self {
        self.entry_module = module.into();
        self
    }

    #[must_use]
    pub fn launcher(&self) -> &str {
        &self.launcher
    }

    /// Single-process when `gpu_count == 0`, otherwise one process per GPU.
    #[must_use]
    pub fn build(&self, gpu_count: usize, config_path: &Path) -> LaunchCommand {
        let config = config_path.to_string_lossy().to_string();
        if gpu_count == 0 {
            LaunchCommand::new(&self.python, ["-m".to_string(), self.entry_module.clone(), config])
        } else {
            LaunchCommand::new(
                &self.launcher,
                [
                    "--nproc-per-node".to_string(),
                    gpu_count.to_string(),
                    "-m".to_string(),
                    self.entry_module.clone(),
                    config,
                ],
            )
        }
    }
}

/// Source of the GPU count used to pick the launch mode.
pub trait DeviceProbe: Send + Sync {
    fn gpu_count(&self) -> usize;
}

/// Counts devices listed by `nvidia-smi --list-gpus`.
///
/// A missing binary or a failed listing means no GPUs.
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    binary: String,
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self { binary: "nvidia-smi".to_string() }
    }
}

impl NvidiaSmi {
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl DeviceProbe for NvidiaSmi {
    fn gpu_count(&self) -> usize {
        let output = match Command::new(&self.binary).arg("--list-gpus").output() {
            Ok(output) => output,
            Err(e) => {
                info!(binary = %self.binary, error = %e, "GPU listing utility not available, assuming no GPUs");
                return 0;
            }
        };

        if !output.status.success() {
            info!(
                binary = %self.binary,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "GPU listing failed, assuming no GPUs"
            );
            return 0;
        }

        let count = count_listed_devices(&String::from_utf8_lossy(&output.stdout));
        info!(gpus = count, "Detected GPUs");
        count
    }
}

fn count_listed_devices(listing: &str) -> usize {
    listing.lines().filter(|line| !line.trim().is_empty()).count()
}

/// Fixed GPU count, for hosts where detection is done elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDeviceProbe(pub usize);

impl DeviceProbe for FixedDeviceProbe {
    fn gpu_count(&self) -> usize {
        self.0
    }
}
