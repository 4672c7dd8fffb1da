use crate::config::EngineConfig;
use crate::domain::engine::{EngineFailure, EngineResult, interpret_output};
use crate::domain::ports::LicenseEngine;
use crate::error::Result;
use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Runs the signing engine as a child process, one fresh process per call.
///
/// The fingerprint and duration are passed as two separate argv entries after
/// any configured leading arguments; no shell is involved. Runs exceeding the
/// configured timeout are killed and reaped before `generate` returns. On
/// unix each run gets its own process group and the whole group is killed,
/// so helpers forked by the engine go down with it.
#[derive(Clone)]
pub struct ProcessEngine {
    config: Arc<EngineConfig>,
    permits: Arc<Semaphore>,
}

struct EngineOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            config: Arc::new(config),
        })
    }

    async fn run(
        &self,
        fingerprint: &str,
        duration_days: u32,
    ) -> std::result::Result<EngineOutput, EngineFailure> {
        let program = &self.config.program;
        let mut command = Command::new(program);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .args(&self.config.leading_args)
            .arg(fingerprint)
            .arg(duration_days.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineFailure::Unavailable(format!(
                    "failed to start engine {}: {e}",
                    program.display()
                ))
            })?;
        let pid = child.id();

        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));
        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();

        let finished = tokio::time::timeout(self.config.timeout, async {
            let status = child.wait().await?;
            let stdout = stdout_task.await.map_err(io::Error::other)??;
            let stderr = stderr_task.await.map_err(io::Error::other)??;
            Ok::<_, io::Error>(EngineOutput {
                status,
                stdout,
                stderr,
            })
        })
        .await;

        match finished {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(EngineFailure::Unavailable(format!(
                "failed to collect engine output: {e}"
            ))),
            Err(_) => {
                stdout_abort.abort();
                stderr_abort.abort();
                kill_engine(&mut child, pid).await;
                Err(EngineFailure::Unavailable(format!(
                    "engine did not finish within {:?}",
                    self.config.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl LicenseEngine for ProcessEngine {
    async fn generate(&self, fingerprint: &str, duration_days: u32) -> EngineResult {
        let Ok(_permit) = self.permits.acquire().await else {
            return EngineResult::Failure(EngineFailure::Unavailable(
                "engine process pool is closed".to_string(),
            ));
        };

        let output = match self.run(fingerprint, duration_days).await {
            Ok(output) => output,
            Err(failure) => return EngineResult::Failure(failure),
        };

        if !output.stderr.is_empty() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "engine wrote to stderr"
            );
        }
        if !output.status.success() {
            return EngineResult::Failure(EngineFailure::Unavailable(format!(
                "engine exited with {}",
                output.status
            )));
        }

        interpret_output(&output.stdout, &self.config.sentinel)
    }
}

// The direct child may already be reaped while a forked helper still holds
// its stdout open, so the group is signalled by the pid captured at spawn.
async fn kill_engine(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // SAFETY: kill(2) takes no pointers; a negative pid addresses the
            // process group created for this run.
            if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
                debug!(
                    error = %io::Error::last_os_error(),
                    pgid,
                    "engine process group already gone"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill timed out engine process");
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
