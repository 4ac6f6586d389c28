//! Completion poller — waits for each stage in pipeline order and classifies
//! the chain according to its [`FailurePolicy`].

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::builder::{reap, teardown, Capture, RunningPipeline, RunningStage};
use super::{FailurePolicy, PipelineError, PipelineOutcome, StageResult, StageStatus};

/// Absolute point in time by which the whole pipeline must have finished.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    pub at: Instant,
    pub budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }
}

/// Wait for one stage to terminate.
pub async fn await_stage(
    stage: &mut RunningStage,
    deadline: Option<Deadline>,
) -> Result<StageStatus, PipelineError> {
    let waited = match deadline {
        Some(deadline) => {
            match tokio::time::timeout_at(deadline.at, stage.child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    return Err(PipelineError::Timeout {
                        program: stage.spec.program.clone(),
                        after: deadline.budget,
                    })
                }
            }
        }
        None => stage.child.wait().await,
    };

    let status = waited.map_err(|source| PipelineError::Wait {
        program: stage.spec.program.clone(),
        source,
    })?;

    stage.exit_code = status.code();
    stage.status = StageStatus::classify(status);
    Ok(stage.status)
}

/// Drive every stage to completion and derive the outcome from the last one.
///
/// All children are reaped before this returns, on every path.
pub async fn await_chain(
    pipeline: RunningPipeline,
    policy: FailurePolicy,
    deadline: Option<Deadline>,
) -> Result<PipelineOutcome, PipelineError> {
    let mut stages = pipeline.stages;
    let last = stages.len() - 1;
    let mut failed_stage = None;

    for index in 0..stages.len() {
        let status = match await_stage(&mut stages[index], deadline).await {
            Ok(status) => status,
            Err(e) => {
                teardown(stages).await;
                return Err(e);
            }
        };

        let stage = &stages[index];
        if status != StageStatus::Failure {
            debug!(stage = index, program = %stage.spec, "ended with success");
            continue;
        }

        if index == last || policy == FailurePolicy::EveryStage {
            error!(
                stage = index,
                program = %stage.spec,
                exit_code = ?stage.exit_code,
                "did not end successfully"
            );
            failed_stage = Some(index);
            break;
        }

        warn!(
            stage = index,
            program = %stage.spec,
            exit_code = ?stage.exit_code,
            "intermediate stage failed, continuing"
        );
    }

    // Stages after an aborting failure are still running.
    for stage in stages.iter_mut() {
        reap(stage).await;
    }

    for index in 0..last {
        let stage = &mut stages[index];
        let collected = collect(
            stage.stderr.take(),
            stage.killed,
            &stage.spec.program,
            deadline,
        )
        .await;
        let stderr = match collected {
            Ok(stderr) => stderr,
            Err(e) => {
                teardown(stages).await;
                return Err(e);
            }
        };
        if stage.status == StageStatus::Failure && !stderr.is_empty() {
            debug!(
                stage = index,
                program = %stage.spec,
                stderr = %String::from_utf8_lossy(&stderr).trim(),
                "stage stderr"
            );
        }
    }

    let Some(mut final_stage) = stages.pop() else {
        unreachable!("pipelines always have at least one stage");
    };

    let collected = collect(
        final_stage.stdout.take(),
        final_stage.killed,
        &final_stage.spec.program,
        deadline,
    )
    .await;
    let stdout = match collected {
        Ok(stdout) => stdout,
        Err(e) => {
            teardown(vec![final_stage]).await;
            return Err(e);
        }
    };
    let stderr = collect(
        final_stage.stderr.take(),
        final_stage.killed,
        &final_stage.spec.program,
        deadline,
    )
    .await?;

    let result = StageResult {
        status: final_stage.status,
        exit_code: final_stage.exit_code,
        stdout,
        stderr,
    };

    if result.status == StageStatus::Failure && !result.stderr.is_empty() {
        debug!(
            program = %final_stage.spec,
            stderr = %result.stderr_text().trim(),
            "stage stderr"
        );
    }

    Ok(PipelineOutcome {
        final_stage: result,
        failed_stage,
    })
}

/// Drain one captured stream, bounded by the pipeline deadline.
///
/// A stage that exited can leave descendants holding its pipes open, so the
/// read is abandoned once the deadline passes. Output of a killed stage is
/// discarded for the same reason.
async fn collect(
    capture: Option<Capture>,
    killed: bool,
    program: &str,
    deadline: Option<Deadline>,
) -> Result<Vec<u8>, PipelineError> {
    let Some(mut handle) = capture else {
        return Ok(Vec::new());
    };
    if killed {
        handle.abort();
        return Ok(Vec::new());
    }

    let joined = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline.at, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(PipelineError::Timeout {
                    program: program.to_string(),
                    after: deadline.budget,
                });
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => {
            debug!(error = %e, "reading stage output failed");
            Ok(Vec::new())
        }
        Err(e) => {
            debug!(error = %e, "output capture task failed");
            Ok(Vec::new())
        }
    }
}
