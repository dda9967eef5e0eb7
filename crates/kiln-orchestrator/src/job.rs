//! Job model and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{OrchestrationError, Result};
use crate::scheduler::JobDescription;

/// Longest accepted base name. Leaves room for the timestamp suffix within
/// the scheduler's 63 character limit.
pub const MAX_BASE_NAME_LEN: usize = 40;
const MAX_NAME_LEN: usize = 63;
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// Unique, immutable job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobName(String);

impl JobName {
    /// Wrap an existing name, e.g. one passed on the command line.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, MAX_NAME_LEN)?;
        Ok(Self(name))
    }

    /// `<base>-YYYYMMDD-HHMMSS-mmm` for the current time.
    pub fn generate(base: &str) -> Result<Self> {
        Self::generate_at(base, Utc::now())
    }

    pub fn generate_at(base: &str, at: DateTime<Utc>) -> Result<Self> {
        validate_name(base, MAX_BASE_NAME_LEN)?;
        Ok(Self(format!("{base}-{}", at.format(TIMESTAMP_FORMAT))))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_name(name: &str, max_len: usize) -> Result<()> {
    if name.is_empty() || name.len() > max_len {
        return Err(OrchestrationError::Configuration(format!(
            "job name '{name}' must be between 1 and {max_len} characters"
        )));
    }
    if name.starts_with('-') || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(OrchestrationError::Configuration(format!(
            "job name '{name}' may only contain letters, digits and inner hyphens"
        )));
    }
    Ok(())
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobName {
    type Error = OrchestrationError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<JobName> for String {
    fn from(name: JobName) -> Self {
        name.0
    }
}

/// Job status as tracked by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Submitted, not yet observed running.
    Pending,
    InProgress,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed | Self::Stopped => 2,
        }
    }

    /// Statuses only move forward, and nothing leaves a terminal status.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            (a, b) if *a == b => true,
            (a, _) if a.is_terminal() => false,
            (a, b) => b.rank() > a.rank(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
        })
    }
}

impl FromStr for JobStatus {
    type Err = OrchestrationError;

    /// Accepts the scheduler's status strings. `Stopping` is still running.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(Self::Pending),
            "InProgress" | "Stopping" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Stopped" => Ok(Self::Stopped),
            other => Err(OrchestrationError::transient("describe_job", format!("unknown job status '{other}'"))),
        }
    }
}

/// Compute resources requested for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub instance_type: String,
    pub instance_count: u32,
    pub volume_size_gb: u32,
    pub max_runtime_secs: u64,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            instance_type: "ml.m5.xlarge".to_string(),
            instance_count: 1,
            volume_size_gb: 100,
            max_runtime_secs: 86_400,
        }
    }
}

/// A status change detected by [`Job::observe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: JobStatus,
    pub to: JobStatus,
    pub secondary_status: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    name: JobName,
    status: JobStatus,
    last_observed: Option<JobStatus>,
    secondary_status: Option<String>,
    failure_reason: Option<String>,
    resources: ResourceSpec,
    billable_seconds: u64,
    output_location: Option<String>,
    created_at: DateTime<Utc>,
}

impl Job {
    /// A freshly submitted job.
    #[must_use]
    pub fn new(name: JobName, resources: ResourceSpec) -> Self {
        Self {
            name,
            status: JobStatus::Pending,
            last_observed: None,
            secondary_status: None,
            failure_reason: None,
            resources,
            billable_seconds: 0,
            output_location: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &JobName {
        &self.name
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    #[must_use]
    pub fn last_observed(&self) -> Option<JobStatus> {
        self.last_observed
    }

    #[must_use]
    pub fn secondary_status(&self) -> Option<&str> {
        self.secondary_status.as_deref()
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceSpec {
        &self.resources
    }

    #[must_use]
    pub fn billable_seconds(&self) -> u64 {
        self.billable_seconds
    }

    #[must_use]
    pub fn output_location(&self) -> Option<&str> {
        self.output_location.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn check_transition(&self, to: JobStatus) -> Result<()> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(OrchestrationError::InvalidTransition { from: self.status.to_string(), to: to.to_string() })
        }
    }

    /// Apply a scheduler description.
    ///
    /// Returns a change only when the observed status differs from the last
    /// one observed. The job is left untouched otherwise.
    pub(crate) fn observe(&mut self, description: &JobDescription) -> Option<StatusChange> {
        let observed = description.status;
        if self.last_observed == Some(observed) {
            return None;
        }

        if let Err(e) = self.check_transition(observed) {
            warn!(job = %self.name, error = %e, "Ignoring out-of-order status");
            return None;
        }

        let change = StatusChange {
            from: self.status,
            to: observed,
            secondary_status: description.secondary_status.clone(),
            observed_at: Utc::now(),
        };

        self.status = observed;
        self.last_observed = Some(observed);
        self.secondary_status.clone_from(&description.secondary_status);
        if description.failure_reason.is_some() {
            self.failure_reason.clone_from(&description.failure_reason);
        }
        if let Some(ref resources) = description.resources {
            self.resources.clone_from(resources);
        }
        if let Some(seconds) = description.billable_seconds {
            self.billable_seconds = seconds;
        }
        if description.output_location.is_some() {
            self.output_location.clone_from(&description.output_location);
        }

        Some(change)
    }
}
