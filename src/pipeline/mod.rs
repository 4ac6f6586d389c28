//! Process pipelines — chains of external commands wired stdout → stdin.
//!
//! A [`PipelineSpec`] describes the chain, [`builder::build`] spawns it,
//! [`poller::await_chain`] drives it to completion and classifies the result.
//! [`run`] does all three.

pub mod builder;
pub mod credential;
pub mod poller;

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

pub use credential::Credential;

/// One external process in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl StageSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Which stage statuses count when deciding whether a pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first failing stage aborts the chain.
    #[default]
    EveryStage,
    /// Only the last stage counts; intermediate failures are logged.
    FinalStage,
}

/// Ordered, non-empty chain of stages.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    stages: Vec<StageSpec>,
    policy: FailurePolicy,
}

impl PipelineSpec {
    pub fn new(first: StageSpec) -> Self {
        Self {
            stages: vec![first],
            policy: FailurePolicy::default(),
        }
    }

    /// Append a stage reading the previous stage's stdout.
    pub fn pipe(mut self, next: StageSpec) -> Self {
        self.stages.push(next);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, stage) in self.stages.iter().enumerate() {
            if index > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Running,
    Success,
    Failure,
}

impl StageStatus {
    /// Exit code 0 is success; any other code, or death by signal, is failure.
    pub fn classify(status: ExitStatus) -> Self {
        if status.success() {
            StageStatus::Success
        } else {
            StageStatus::Failure
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub status: StageStatus,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl StageResult {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub final_stage: StageResult,
    pub failed_stage: Option<usize>,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed_stage.is_none() && self.final_stage.status == StageStatus::Success
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect `{program}` to the next stage: {source}")]
    Wiring {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` did not finish within {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },
}

/// Spawn `spec`, feed it `credential` if any, and wait for it within `timeout`.
pub async fn run(
    spec: &PipelineSpec,
    credential: Option<&Credential>,
    timeout: Option<Duration>,
) -> Result<PipelineOutcome, PipelineError> {
    let deadline = timeout.map(poller::Deadline::after);
    let pipeline = builder::build(spec, credential, deadline).await?;
    poller::await_chain(pipeline, spec.policy(), deadline).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_stages_with_pipes() {
        let spec = PipelineSpec::new(StageSpec::new("top", ["-b", "-n", "1"]))
            .pipe(StageSpec::new("head", ["-n", "8"]))
            .pipe(StageSpec::new("tail", ["-n", "1"]));

        assert_eq!(spec.to_string(), "top -b -n 1 | head -n 8 | tail -n 1");
        assert_eq!(spec.stages().len(), 3);
        assert_eq!(spec.policy(), FailurePolicy::EveryStage);
    }

    #[test]
    fn test_outcome_requires_no_failed_stage() {
        let outcome = PipelineOutcome {
            final_stage: StageResult {
                status: StageStatus::Success,
                exit_code: Some(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
            failed_stage: Some(0),
        };

        assert!(!outcome.succeeded());
    }
}
