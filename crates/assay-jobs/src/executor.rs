//! Step execution.
//!
//! Runs one workflow step as a child process against a job's workspace:
//!
//! - the interpreter is chosen by the step's [`StepKind`]
//! - the script path is `<steps_dir>/<step id>`
//! - the only argument is the absolute workspace path, which is also the
//!   working directory and is exported through an environment variable
//! - stdout and stderr are drained concurrently for the whole life of the
//!   process and forwarded to `tracing` line by line
//!
//! A step succeeds iff the process exits with status zero.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::workflow::{StepDescriptor, StepKind};

/// Why a step did not succeed.
#[derive(Debug, Error)]
pub enum StepError {
    /// The identifier is empty, absolute, or climbs out of the steps directory.
    #[error("invalid step identifier '{0}'")]
    InvalidStep(String),

    /// No interpreter is registered for the identifier's suffix.
    #[error("unsupported step type '{0}' (expected .py, .js or .cjs)")]
    UnsupportedKind(String),

    #[error("failed to start step '{step}': {source}")]
    Spawn {
        step: String,
        #[source]
        source: io::Error,
    },

    #[error("step '{step}' exited with code {code}")]
    ExitStatus { step: String, code: i32 },

    #[error("step '{step}' was terminated{}", signal_suffix(.signal))]
    Terminated { step: String, signal: Option<i32> },

    #[error("step '{step}' exceeded its deadline of {}s", .timeout.as_secs_f64())]
    TimedOut { step: String, timeout: Duration },

    #[error("failed to supervise step '{step}': {source}")]
    Io {
        step: String,
        #[source]
        source: io::Error,
    },
}

fn signal_suffix(signal: &Option<i32>) -> String {
    signal.map(|s| format!(" by signal {s}")).unwrap_or_default()
}

/// Interpreter programs for each supported step kind.
#[derive(Debug, Clone)]
pub struct Interpreters {
    pub python: String,
    pub node: String,
}

impl Default for Interpreters {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            node: "node".to_string(),
        }
    }
}

impl Interpreters {
    pub fn for_kind(&self, kind: StepKind) -> &str {
        match kind {
            StepKind::Python => &self.python,
            StepKind::Node => &self.node,
        }
    }
}

/// Configuration for [`StepExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Directory step identifiers are resolved against.
    pub steps_dir: PathBuf,
    pub interpreters: Interpreters,
    /// Environment variable that carries the workspace path.
    pub workspace_env: String,
    /// Kill a step that runs longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl ExecutorConfig {
    pub fn new(steps_dir: impl Into<PathBuf>) -> Self {
        Self {
            steps_dir: steps_dir.into(),
            interpreters: Interpreters::default(),
            workspace_env: "WORK_DIR".to_string(),
            timeout: None,
        }
    }

    pub fn with_interpreters(mut self, interpreters: Interpreters) -> Self {
        self.interpreters = interpreters;
        self
    }

    pub fn with_workspace_env(mut self, name: impl Into<String>) -> Self {
        self.workspace_env = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Summary of a successful step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: String,
    pub duration: Duration,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Spawns and supervises step processes, one at a time per caller.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(mut config: ExecutorConfig) -> Self {
        // Steps run with the workspace as cwd, so a relative steps dir would
        // resolve against the wrong place.
        if let Ok(absolute) = std::path::absolute(&config.steps_dir) {
            config.steps_dir = absolute;
        }
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Absolute path of the script a step resolves to.
    pub fn script_path(&self, step: &StepDescriptor) -> PathBuf {
        self.config.steps_dir.join(step.id())
    }

    /// Resolve a raw identifier and run it.
    pub async fn run_identifier(&self, id: &str, workspace: &Path) -> Result<StepReport, StepError> {
        let step = StepDescriptor::parse(id)?;
        self.run(&step, workspace).await
    }

    /// Run one step to completion against `workspace`.
    pub async fn run(&self, step: &StepDescriptor, workspace: &Path) -> Result<StepReport, StepError> {
        let started = Instant::now();
        let interpreter = self.config.interpreters.for_kind(step.kind());
        let script = self.script_path(step);

        tracing::info!(
            step = %step,
            kind = %step.kind(),
            interpreter,
            script = %script.display(),
            "Starting step"
        );

        let mut child = Command::new(interpreter)
            .arg(&script)
            .arg(workspace)
            .current_dir(workspace)
            .env(&self.config.workspace_env, workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StepError::Spawn {
                step: step.id().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().map(|s| drain(s, step.id(), OutputStream::Stdout));
        let stderr = child.stderr.take().map(|s| drain(s, step.id(), OutputStream::Stderr));

        let waited = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    tracing::warn!(step = %step, timeout_secs = limit.as_secs_f64(), "Step deadline exceeded, killing");
                    let _ = child.kill().await;
                    // Orphaned grandchildren may still hold the pipes open.
                    abort_reader(stdout);
                    abort_reader(stderr);
                    return Err(StepError::TimedOut {
                        step: step.id().to_string(),
                        timeout: limit,
                    });
                }
            },
            None => child.wait().await,
        };

        // Readers are joined before the status is looked at so no output is lost.
        let stdout_lines = join_reader(stdout).await;
        let stderr_lines = join_reader(stderr).await;

        let status = waited.map_err(|source| StepError::Io {
            step: step.id().to_string(),
            source,
        })?;
        let duration = started.elapsed();

        check_status(step.id(), status)?;

        tracing::info!(
            step = %step,
            duration_ms = duration.as_millis() as u64,
            stdout_lines,
            stderr_lines,
            "Step finished"
        );

        Ok(StepReport {
            step: step.id().to_string(),
            duration,
            stdout_lines,
            stderr_lines,
        })
    }
}

fn check_status(step: &str, status: ExitStatus) -> Result<(), StepError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(StepError::ExitStatus {
            step: step.to_string(),
            code,
        }),
        None => Err(StepError::Terminated {
            step: step.to_string(),
            signal: signal_of(status),
        }),
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

/// Forward every line of a child stream to tracing until EOF.
///
/// Reads raw bytes so that non-UTF-8 output cannot stop the drain.
fn drain<R>(reader: R, step: &str, stream: OutputStream) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let step = step.to_string();
    tokio::spawn(
        async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            let mut lines = 0usize;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        lines += 1;
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\r', '\n']);
                        match stream {
                            OutputStream::Stdout => tracing::info!(step = %step, stream = "stdout", "{line}"),
                            OutputStream::Stderr => tracing::warn!(step = %step, stream = "stderr", "{line}"),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(step = %step, ?stream, error = %e, "Stopped reading step output");
                        break;
                    }
                }
            }
            lines
        }
        .in_current_span(),
    )
}

fn abort_reader(handle: Option<JoinHandle<usize>>) {
    if let Some(handle) = handle {
        handle.abort();
    }
}

async fn join_reader(handle: Option<JoinHandle<usize>>) -> usize {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        steps: PathBuf,
        workspace: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let steps = dir.path().join("steps");
        let workspace = dir.path().join("work");
        fs::create_dir_all(&steps).unwrap();
        fs::create_dir_all(&workspace).unwrap();
        let workspace = workspace.canonicalize().unwrap();
        Fixture {
            _dir: dir,
            steps,
            workspace,
        }
    }

    fn write_step(steps: &Path, name: &str, body: &str) {
        let path = steps.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    /// Both step kinds run through `sh`, so tests need neither Python nor Node.
    fn executor(steps: &Path) -> StepExecutor {
        StepExecutor::new(ExecutorConfig::new(steps).with_interpreters(Interpreters {
            python: "sh".to_string(),
            node: "sh".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_successful_step() {
        let fx = fixture();
        write_step(&fx.steps, "ok.py", "echo hello\n");

        let report = executor(&fx.steps)
            .run_identifier("ok.py", &fx.workspace)
            .await
            .unwrap();
        assert_eq!(report.step, "ok.py");
        assert_eq!(report.stdout_lines, 1);
        assert_eq!(report.stderr_lines, 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let fx = fixture();
        write_step(&fx.steps, "bad.js", "echo oops >&2\nexit 3\n");

        let err = executor(&fx.steps)
            .run_identifier("bad.js", &fx.workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::ExitStatus { code: 3, .. }));
    }

    #[tokio::test]
    async fn test_step_sees_workspace_as_arg_env_and_cwd() {
        let fx = fixture();
        write_step(
            &fx.steps,
            "nested/inspect.cjs",
            "printf '%s\\n' \"$1\" > arg.txt\nprintf '%s\\n' \"$WORK_DIR\" > env.txt\npwd -P > cwd.txt\n",
        );

        executor(&fx.steps)
            .run_identifier("nested/inspect.cjs", &fx.workspace)
            .await
            .unwrap();

        let expected = fx.workspace.display().to_string();
        for file in ["arg.txt", "env.txt", "cwd.txt"] {
            let contents = fs::read_to_string(fx.workspace.join(file)).unwrap();
            assert_eq!(contents.trim(), expected, "{file}");
        }
    }

    #[tokio::test]
    async fn test_custom_workspace_env() {
        let fx = fixture();
        write_step(&fx.steps, "env.py", "printf '%s' \"$JOB_DIR\" > env.txt\n");

        let exec = StepExecutor::new(
            ExecutorConfig::new(&fx.steps)
                .with_interpreters(Interpreters {
                    python: "sh".to_string(),
                    node: "sh".to_string(),
                })
                .with_workspace_env("JOB_DIR"),
        );
        exec.run_identifier("env.py", &fx.workspace).await.unwrap();

        let contents = fs::read_to_string(fx.workspace.join("env.txt")).unwrap();
        assert_eq!(contents, fx.workspace.display().to_string());
    }

    #[tokio::test]
    async fn test_unsupported_suffix_fails_without_spawning() {
        let fx = fixture();
        write_step(&fx.steps, "run.sh", "touch spawned\n");

        let err = executor(&fx.steps)
            .run_identifier("run.sh", &fx.workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::UnsupportedKind(_)));
        assert!(!fx.workspace.join("spawned").exists());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_failure() {
        let fx = fixture();
        write_step(&fx.steps, "a.py", "true\n");

        let exec = StepExecutor::new(ExecutorConfig::new(&fx.steps).with_interpreters(
            Interpreters {
                python: "/nonexistent/interpreter".to_string(),
                node: "sh".to_string(),
            },
        ));
        let err = exec.run_identifier("a.py", &fx.workspace).await.unwrap_err();
        assert!(matches!(err, StepError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams_does_not_deadlock() {
        let fx = fixture();
        // Far beyond a pipe buffer on either stream.
        write_step(
            &fx.steps,
            "noisy.py",
            "i=0\nwhile [ $i -lt 20000 ]; do echo \"out line $i padding padding padding\"; echo \"err line $i padding padding padding\" >&2; i=$((i+1)); done\n",
        );

        let exec = StepExecutor::new(
            ExecutorConfig::new(&fx.steps)
                .with_interpreters(Interpreters {
                    python: "sh".to_string(),
                    node: "sh".to_string(),
                })
                .with_timeout(Some(Duration::from_secs(60))),
        );
        let report = exec.run_identifier("noisy.py", &fx.workspace).await.unwrap();
        assert_eq!(report.stdout_lines, 20000);
        assert_eq!(report.stderr_lines, 20000);
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_drained() {
        let fx = fixture();
        write_step(&fx.steps, "bytes.py", "printf '\\377\\376\\n'\necho after\n");

        let report = executor(&fx.steps)
            .run_identifier("bytes.py", &fx.workspace)
            .await
            .unwrap();
        assert_eq!(report.stdout_lines, 2);
    }

    #[tokio::test]
    async fn test_deadline_kills_step() {
        let fx = fixture();
        write_step(&fx.steps, "slow.py", "sleep 30\n");

        let exec = StepExecutor::new(
            ExecutorConfig::new(&fx.steps)
                .with_interpreters(Interpreters {
                    python: "sh".to_string(),
                    node: "sh".to_string(),
                })
                .with_timeout(Some(Duration::from_millis(200))),
        );
        let started = Instant::now();
        let err = exec.run_identifier("slow.py", &fx.workspace).await.unwrap_err();
        assert!(matches!(err, StepError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_step_is_terminated() {
        let fx = fixture();
        write_step(&fx.steps, "suicide.py", "kill -9 $$\n");

        let err = executor(&fx.steps)
            .run_identifier("suicide.py", &fx.workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Terminated { signal: Some(9), .. }));
    }
}
