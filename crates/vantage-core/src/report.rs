//! Deployment reporting
//!
//! Per-host, per-step outcomes collected while a deployment runs,
//! serializable for `--format json`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::inventory::ServiceKind;

/// Outcome of a full deployment run
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Archive uploads to the file-transfer source server
    pub staged: Vec<StagedArchive>,
    pub hosts: Vec<HostReport>,
}

impl DeployReport {
    /// Whether any step on any host failed
    pub fn failed(&self) -> bool {
        self.hosts.iter().any(|h| h.failed())
    }

    /// (changed, skipped, failed) step counts across all hosts
    pub fn step_totals(&self) -> (usize, usize, usize) {
        let mut totals = (0, 0, 0);
        for host in &self.hosts {
            for step in &host.steps {
                match step.outcome {
                    StepOutcome::Changed => totals.0 += 1,
                    StepOutcome::Skipped => totals.1 += 1,
                    StepOutcome::Failed { .. } => totals.2 += 1,
                }
            }
        }
        totals
    }
}

/// One archive staged on the source server
#[derive(Debug, Clone, Serialize)]
pub struct StagedArchive {
    pub service: ServiceKind,
    pub remote_path: PathBuf,
    /// False when the archive was already present and kept
    pub uploaded: bool,
}

/// Steps executed against a single host for one service
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub ip: String,
    pub service: ServiceKind,
    pub steps: Vec<StepReport>,
}

impl HostReport {
    pub fn failed(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
    }
}

/// One executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub description: String,
    pub outcome: StepOutcome,
}

/// What happened to a step
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step ran and changed the host
    Changed,
    /// Nothing to do (probe hit, archive already present)
    Skipped,
    /// The step failed; remaining steps on the host were not run
    Failed { message: String },
}
