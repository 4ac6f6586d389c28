//! Process chain builder — spawns every stage eagerly, in order, wiring each
//! stage's stdout into the next stage's stdin.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use super::credential::{self, Credential};
use super::poller::Deadline;
use super::{PipelineError, PipelineSpec, StageSpec, StageStatus};

pub(crate) type Capture = JoinHandle<std::io::Result<Vec<u8>>>;

/// A spawned stage and the tasks draining its output streams.
pub struct RunningStage {
    pub(crate) spec: StageSpec,
    pub(crate) child: Child,
    pub(crate) status: StageStatus,
    pub(crate) exit_code: Option<i32>,
    pub(crate) killed: bool,
    pub(crate) stdout: Option<Capture>,
    pub(crate) stderr: Option<Capture>,
}

/// Live handle over every spawned stage of a pipeline.
pub struct RunningPipeline {
    pub(crate) stages: Vec<RunningStage>,
}

impl RunningPipeline {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

pub async fn build(
    spec: &PipelineSpec,
    credential: Option<&Credential>,
    deadline: Option<Deadline>,
) -> Result<RunningPipeline, PipelineError> {
    let last = spec.stages().len() - 1;
    let mut stages: Vec<RunningStage> = Vec::with_capacity(spec.stages().len());
    let mut upstream: Option<Stdio> = None;

    for (index, stage) in spec.stages().iter().enumerate() {
        let stdin = match upstream.take() {
            Some(pipe) => pipe,
            None if credential.is_some() => Stdio::piped(),
            None => Stdio::null(),
        };

        let spawned = Command::new(&stage.program)
            .args(&stage.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                teardown(stages).await;
                return Err(PipelineError::Spawn {
                    program: stage.program.clone(),
                    source,
                });
            }
        };
        debug!(stage = index, program = %stage, pid = ?child.id(), "spawned");

        if index == 0 {
            if let Some(credential) = credential {
                let relay = credential::relay(&mut child, credential, &stage.program);
                match deadline {
                    Some(deadline) => {
                        if tokio::time::timeout_at(deadline.at, relay).await.is_err() {
                            let _ = child.start_kill();
                            let _ = child.wait().await;
                            return Err(PipelineError::Timeout {
                                program: stage.program.clone(),
                                after: deadline.budget,
                            });
                        }
                    }
                    None => relay.await,
                }
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take().map(capture);

        let mut running = RunningStage {
            spec: stage.clone(),
            child,
            status: StageStatus::Running,
            exit_code: None,
            killed: false,
            stdout: None,
            stderr,
        };

        if index == last {
            running.stdout = stdout.map(capture);
            stages.push(running);
            continue;
        }

        let wired: std::io::Result<Stdio> = match stdout {
            Some(out) => out.try_into(),
            None => Err(std::io::Error::other("stdout was not captured")),
        };
        stages.push(running);

        match wired {
            Ok(pipe) => upstream = Some(pipe),
            Err(source) => {
                teardown(stages).await;
                return Err(PipelineError::Wiring {
                    program: stage.program.clone(),
                    source,
                });
            }
        }
    }

    Ok(RunningPipeline { stages })
}

/// Kill and reap every stage that has not been waited on yet.
pub(crate) async fn teardown(stages: Vec<RunningStage>) {
    for mut stage in stages {
        reap(&mut stage).await;
        abort_capture(stage.stdout.take());
        abort_capture(stage.stderr.take());
    }
}

/// Kill one stage if it is still running and collect its exit status.
pub(crate) async fn reap(stage: &mut RunningStage) {
    if stage.status != StageStatus::Running {
        return;
    }
    let _ = stage.child.start_kill();
    stage.killed = true;
    match stage.child.wait().await {
        Ok(status) => stage.exit_code = status.code(),
        Err(e) => debug!(program = %stage.spec, error = %e, "reaping failed"),
    }
    stage.status = StageStatus::Failure;
}

fn abort_capture(capture: Option<Capture>) {
    if let Some(handle) = capture {
        handle.abort();
    }
}

fn capture<R>(mut reader: R) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}
