use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::{
    io::AsyncReadExt,
    process::{Child, Command},
    time::{Duration, Instant, timeout},
};

use crate::{
    constants::{KILL_GRACE_MS, PROBE_TIMEOUT_SECS},
    core::{
        domain::{CommandSpec, ExecutionRequest, ExecutionResult, ProbeReport},
        traits::runner::{RunError, Runner},
    },
    native::artifact::TransientArtifact,
};

/// Runs the external program against a per-call artifact in `scratch_dir`.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    scratch_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new<T: AsRef<Path>>(scratch_dir: T) -> Self {
        ProcessRunner {
            scratch_dir: scratch_dir.as_ref().into(),
        }
    }

    async fn execute(
        &self,
        artifact: &TransientArtifact,
        request: &ExecutionRequest,
        command: &CommandSpec,
    ) -> Result<ExecutionResult, RunError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(command.arguments_for(artifact.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let start_time = Instant::now();
        let mut child = cmd.spawn().map_err(|e| RunError::Launch {
            program: command.program.display().to_string(),
            reason: e.to_string(),
        })?;
        // Kept for the group kill: `child.id()` is gone once the leader is reaped.
        let pgid = child.id();
        tracing::debug!(pid = ?pgid, "Process spawned");

        let (mut stdout, mut stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                terminate(&mut child, pgid);
                return Err(RunError::Internal {
                    msg: "process output pipes were not captured".to_string(),
                });
            }
        };

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        // Reads append in place, so whatever arrived before the deadline
        // stays in the buffers when this future is dropped.
        let waited = timeout(request.timeout(), async {
            let (status, out, err) = tokio::join!(
                child.wait(),
                stdout.read_to_end(&mut stdout_buf),
                stderr.read_to_end(&mut stderr_buf),
            );
            out?;
            err?;
            Ok::<ExitStatus, std::io::Error>(status?)
        })
        .await;

        let exit_code = match waited {
            Ok(Ok(status)) => Some(code_of(status)),
            Ok(Err(e)) => {
                terminate(&mut child, pgid);
                return Err(RunError::Internal {
                    msg: format!("failed to wait for process: {}", e),
                });
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = request.timeout().as_secs(),
                    "Process timed out, terminating"
                );
                terminate(&mut child, pgid);

                let grace = Duration::from_millis(KILL_GRACE_MS);
                let _ = timeout(grace, async {
                    let _ = tokio::join!(
                        stdout.read_to_end(&mut stdout_buf),
                        stderr.read_to_end(&mut stderr_buf),
                    );
                })
                .await;
                if timeout(grace, child.wait()).await.is_err() {
                    tracing::warn!(pid = ?child.id(), "Terminated process was not reaped");
                }
                None
            }
        };

        let result = ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
            stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
            timed_out: exit_code.is_none(),
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        };

        Ok(result)
    }
}

#[async_trait::async_trait]
impl Runner for ProcessRunner {
    #[tracing::instrument(
        skip(self, request),
        fields(source = ?request.source_label(), bytes = request.payload().len())
    )]
    async fn run(
        &self,
        request: &ExecutionRequest,
        command: &CommandSpec,
    ) -> Result<ExecutionResult, RunError> {
        let artifact = TransientArtifact::create(&self.scratch_dir, request.payload()).await?;
        let outcome = self.execute(&artifact, request, command).await;
        artifact.release().await;

        match &outcome {
            Ok(result) => tracing::info!(
                exit_code = ?result.exit_code,
                timed_out = result.timed_out,
                execution_time_ms = result.execution_time_ms,
                "Execution finished"
            ),
            Err(e) => tracing::error!(error = %e, "Execution failed"),
        }

        outcome
    }

    #[tracing::instrument(skip(self))]
    async fn probe(&self, command: &CommandSpec) -> ProbeReport {
        let output = Command::new(&command.program)
            .args(&command.version_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), output).await {
            Ok(Ok(out)) if out.status.success() => ProbeReport {
                available: true,
                version_text: String::from_utf8_lossy(&out.stdout).to_string(),
            },
            Ok(Ok(out)) => {
                tracing::debug!(status = %out.status, "Probe exited unsuccessfully");
                ProbeReport::unavailable()
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Probe failed to launch");
                ProbeReport::unavailable()
            }
            Err(_) => {
                tracing::debug!("Probe timed out");
                ProbeReport::unavailable()
            }
        }
    }
}

/// Kills the whole process group on Unix, then the child itself.
///
/// `pgid` is the pid recorded at spawn; the group outlives its leader
/// while any member is still running.
fn terminate(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    {
        // The child leads its own group, see `process_group(0)` above.
        if let Some(pgid) = pgid {
            unsafe {
                libc::kill(-(pgid as i32), libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;

    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Kill after group signal failed");
    }
}

fn code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;
    use itertools::Itertools;

    use super::*;
    use crate::core::domain::ArgTemplate;

    fn sh() -> CommandSpec {
        CommandSpec::new("/bin/sh", vec![ArgTemplate::ArtifactPath])
    }

    fn request(script: &str, timeout_secs: u64) -> ExecutionRequest {
        ExecutionRequest::new(script, Some("test.tcl".to_string()), timeout_secs).unwrap()
    }

    fn artifacts_left(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_run_success() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());

        let result = runner
            .run(&request("echo 'Hello, World!'", 10), &sh())
            .await
            .unwrap();

        assert!(result.succeeded());
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "Hello, World!\n");
        assert_eq!(result.stderr, "");
        assert!(!result.timed_out);
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_a_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());

        let result = runner
            .run(&request("echo boom >&2; exit 3", 10), &sh())
            .await
            .unwrap();

        assert!(!result.succeeded());
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "boom\n");
        assert!(!result.timed_out);
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_run_separates_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());

        let result = runner
            .run(
                &request("echo out1; echo err1 >&2; echo out2; echo err2 >&2", 10),
                &sh(),
            )
            .await
            .unwrap();

        assert_eq!(result.stdout, "out1\nout2\n");
        assert_eq!(result.stderr, "err1\nerr2\n");
    }

    #[tokio::test]
    async fn test_run_passes_artifact_path_as_argument() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let command = CommandSpec::new("/bin/cat", vec![ArgTemplate::ArtifactPath]);

        let result = runner
            .run(&request("puts \"$x; `rm -rf /`\"", 10), &command)
            .await
            .unwrap();

        assert!(result.succeeded());
        assert_eq!(result.stdout, "puts \"$x; `rm -rf /`\"");
    }

    #[tokio::test]
    async fn test_run_has_no_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());

        let result = runner
            .run(&request("cat; echo done", 10), &sh())
            .await
            .unwrap();

        assert_eq!(result.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let started = std::time::Instant::now();

        let result = runner
            .run(&request("echo started; sleep 30", 1), &sh())
            .await
            .unwrap();

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(!result.succeeded());
        assert_eq!(result.stdout, "started\n");
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_run_timeout_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let marker = dir.path().join("marker");
        let script = format!("(sleep 2; touch {}) & wait", marker.display());

        let result = runner.run(&request(&script, 1), &sh()).await.unwrap();
        assert!(result.timed_out);

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_run_timeout_kills_children_after_leader_exits() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let marker = dir.path().join("marker");
        let script = format!("(sleep 3; touch {}) & exit 0", marker.display());

        let result = runner.run(&request(&script, 1), &sh()).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);

        tokio::time::sleep(std::time::Duration::from_secs(4)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_run_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let command = CommandSpec::new("/nonexistent/OpenSees", vec![ArgTemplate::ArtifactPath]);

        let result = runner.run(&request("puts hi", 10), &command).await;

        assert!(matches!(result, Err(RunError::Launch { .. })));
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_run_artifact_write_error() {
        // /proc is readonly dir
        let runner = ProcessRunner::new("/proc/opensees_gateway_test");

        let result = runner.run(&request("puts hi", 10), &sh()).await;

        assert!(matches!(result, Err(RunError::ArtifactWrite { .. })));
    }

    #[tokio::test]
    async fn test_run_signal_reports_negative_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());

        let result = runner
            .run(&request("kill -9 $$", 10), &sh())
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(-9));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_run_twice_uses_independent_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let req = request("echo \"$0\"; exit 4", 10);

        let first = runner.run(&req, &sh()).await.unwrap();
        let second = runner.run(&req, &sh()).await.unwrap();

        assert_ne!(first.stdout, second.stdout);
        assert_eq!(first.exit_code, second.exit_code);
        assert_eq!(first.succeeded(), second.succeeded());
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_run_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ProcessRunner::new(dir.path()));
        let command = sh();

        let runs = (0..16).map(|i| {
            let runner = runner.clone();
            let command = command.clone();
            async move {
                let req = request(&format!("echo {}; echo \"$0\" >&2; exit {}", i, i % 3), 10);
                (i, runner.run(&req, &command).await.unwrap())
            }
        });
        let results = join_all(runs).await;

        for (i, result) in &results {
            assert_eq!(result.stdout, format!("{}\n", i));
            assert_eq!(result.exit_code, Some(i % 3));
        }
        assert!(results.iter().map(|(_, r)| &r.stderr).all_unique());
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_probe_available() {
        let runner = ProcessRunner::new(std::env::temp_dir());
        let command = CommandSpec::new("/bin/echo", vec![])
            .with_version_args(vec!["OpenSees 3.7.1".to_string()]);

        let report = runner.probe(&command).await;

        assert!(report.available);
        assert_eq!(report.version_text, "OpenSees 3.7.1\n");
    }

    #[tokio::test]
    async fn test_probe_nonzero_exit_is_unavailable() {
        let runner = ProcessRunner::new(std::env::temp_dir());
        let command = CommandSpec::new("/bin/sh", vec![])
            .with_version_args(vec!["-c".to_string(), "echo 3.7; exit 1".to_string()]);

        let report = runner.probe(&command).await;

        assert_eq!(report, ProbeReport::unavailable());
    }

    #[tokio::test]
    async fn test_probe_missing_program_is_unavailable() {
        let runner = ProcessRunner::new(std::env::temp_dir());
        let command = CommandSpec::new("/nonexistent/OpenSees", vec![]);

        let report = runner.probe(&command).await;

        assert!(!report.available);
        assert_eq!(report.version_text, ProbeReport::NOT_AVAILABLE);
    }
}
