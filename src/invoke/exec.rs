use std::env;
use std::io::{Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use shared_child::SharedChild;

use super::context::Context;
use crate::error::{NetchainError, NetchainResult, PluginError};
use crate::wrap;

/// How often a running plugin is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the output readers once a killed plugin was reaped.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// How long to wait for EOF on the pipes after the plugin exited on its own.
/// Processes it left running in the background may keep them open.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Runs plugin executables. The chain orchestrator only talks to plugins
/// through this trait so tests can swap in an in-process fake.
pub trait Exec: Send + Sync {
    /// Run the plugin at `plugin_path` with `stdin` as input and the given
    /// protocol variables, returning its stdout.
    fn exec_plugin(
        &self,
        ctx: &Context,
        plugin_path: &Path,
        stdin: &[u8],
        env: &[(String, String)],
    ) -> NetchainResult<Vec<u8>>;

    fn find_in_path(&self, plugin: &str, paths: &[PathBuf]) -> NetchainResult<PathBuf> {
        find_in_path(plugin, paths)
    }
}

/// Result of plugin execution
enum PluginResult {
    Success(Vec<u8>),
    Error { status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8> },
}

/// Executes plugins as child processes.
#[derive(Clone, Debug, Default)]
pub struct RawExec {
    timeout: Option<Duration>,
}

impl RawExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill plugins that run longer than `timeout`, on top of any context deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        RawExec {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn limit(&self, ctx: &Context) -> Option<Duration> {
        match (self.timeout, ctx.remaining()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

impl Exec for RawExec {
    fn exec_plugin(
        &self,
        ctx: &Context,
        plugin_path: &Path,
        stdin: &[u8],
        env: &[(String, String)],
    ) -> NetchainResult<Vec<u8>> {
        let name = plugin_path.file_name().unwrap_or_default().to_os_string();
        match self.run(ctx, plugin_path, stdin, env)? {
            PluginResult::Success(stdout) => Ok(stdout),
            PluginResult::Error {
                status,
                stdout,
                stderr,
            } => {
                debug!("plugin {:?} failed: {}", name, status);
                Err(handle_plugin_error(status, &stdout, &stderr))
            }
        }
    }
}

impl RawExec {
    fn run(
        &self,
        ctx: &Context,
        plugin_path: &Path,
        input: &[u8],
        env: &[(String, String)],
    ) -> NetchainResult<PluginResult> {
        let mut cmd = Command::new(plugin_path);
        // the plugin gets our environment minus anything of a previous invocation
        for (key, _) in env::vars_os() {
            if key.to_string_lossy().starts_with("CNI_") {
                cmd.env_remove(key);
            }
        }
        cmd.envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let mut child = wrap!(
            cmd.spawn(),
            format!("failed to execute plugin {:?}", plugin_path)
        )?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(SharedChild::new(child)?);

        // Write stdin from its own thread, a plugin that exits without
        // reading its input must not block us.
        if let Some(mut pipe) = stdin {
            let data = input.to_vec();
            thread::spawn(move || {
                // Broken pipe just means the plugin did not care about its input.
                let _ = pipe.write_all(&data);
                // Close stdin here to avoid that the plugin waits forever for an EOF.
                drop(pipe);
            });
        }

        let (done_tx, done_rx) = mpsc::channel();
        let stdout_buf = spawn_reader(stdout, done_tx.clone());
        let stderr_buf = spawn_reader(stderr, done_tx);

        let (status_tx, status_rx) = mpsc::channel();
        let waiter = child.clone();
        thread::spawn(move || {
            let _ = status_tx.send(waiter.wait());
        });

        let limit = self.limit(ctx);
        let status = loop {
            match status_rx.recv_timeout(POLL_INTERVAL) {
                Ok(status) => break wrap!(status, "wait for plugin to exit")?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NetchainError::msg("plugin waiter exited without a status"))
                }
            }

            if ctx.is_cancelled() {
                kill_and_reap(&child, &status_rx);
                drain(&done_rx, DRAIN_GRACE);
                return Err(NetchainError::Cancelled {
                    stderr: snapshot(&stderr_buf),
                });
            }
            if let Some(limit) = limit {
                if started.elapsed() >= limit {
                    warn!(
                        "plugin {:?} did not finish within {:?}, killing it",
                        plugin_path, limit
                    );
                    kill_and_reap(&child, &status_rx);
                    drain(&done_rx, DRAIN_GRACE);
                    return Err(NetchainError::Timeout {
                        after: limit,
                        stderr: snapshot(&stderr_buf),
                    });
                }
            }
        };

        if !drain(&done_rx, EXIT_GRACE) {
            debug!(
                "output of plugin {:?} still open after it exited, using what was read",
                plugin_path
            );
        }

        let stdout = take(&stdout_buf);
        let stderr = take(&stderr_buf);
        if !stderr.is_empty() {
            debug!(
                "plugin {:?} stderr: {}",
                plugin_path,
                String::from_utf8_lossy(&stderr).trim_end()
            );
        }

        if status.success() {
            Ok(PluginResult::Success(stdout))
        } else {
            Ok(PluginResult::Error {
                status,
                stdout,
                stderr,
            })
        }
    }
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Read the pipe into a shared buffer chunk by chunk, so that partial output
/// is visible while the plugin still runs.
fn spawn_reader<R>(pipe: Option<R>, done: mpsc::Sender<()>) -> SharedBuf
where
    R: Read + Send + 'static,
{
    let buf: SharedBuf = Arc::new(Mutex::new(Vec::new()));
    let shared = buf.clone();
    thread::spawn(move || {
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match shared.lock() {
                        Ok(mut b) => b.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
        }
        let _ = done.send(());
    });
    buf
}

fn kill_and_reap(
    child: &SharedChild,
    status_rx: &mpsc::Receiver<std::io::Result<ExitStatus>>,
) {
    if let Err(e) = child.kill() {
        warn!("failed to kill plugin process {}: {}", child.id(), e);
    }
    // the waiter thread reaps the process
    let _ = status_rx.recv();
}

/// Wait up to `grace` for both readers to hit EOF, true if they did.
fn drain(done_rx: &mpsc::Receiver<()>, grace: Duration) -> bool {
    let until = Instant::now() + grace;
    for _ in 0..2 {
        let left = until.saturating_duration_since(Instant::now());
        if done_rx.recv_timeout(left).is_err() {
            return false;
        }
    }
    true
}

fn snapshot(buf: &SharedBuf) -> String {
    match buf.lock() {
        Ok(b) => String::from_utf8_lossy(&b).into_owned(),
        Err(_) => String::new(),
    }
}

fn take(buf: &SharedBuf) -> Vec<u8> {
    match buf.lock() {
        Ok(mut b) => std::mem::take(&mut *b),
        Err(_) => Vec::new(),
    }
}

/// Turn a failed run into an error. A plugin that printed an error object
/// gets it back verbatim, anything else reports status and raw output.
fn handle_plugin_error(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> NetchainError {
    if status.code().is_some() {
        if let Ok(err) = serde_json::from_slice::<PluginError>(stdout) {
            return NetchainError::Plugin(err);
        }
    }
    let status = match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("killed by signal {}", sig),
        (None, None) => status.to_string(),
    };
    let mut output = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&String::from_utf8_lossy(stderr));
    }
    NetchainError::ExecFailed {
        status,
        output: output.trim_end().to_string(),
    }
}

/// Look for the executable `plugin` in the given directories, first hit wins.
pub fn find_in_path(plugin: &str, paths: &[PathBuf]) -> NetchainResult<PathBuf> {
    if plugin.is_empty() {
        return Err(NetchainError::NoPluginName);
    }
    if paths.is_empty() {
        return Err(NetchainError::NoPaths);
    }
    for dir in paths {
        let candidate = dir.join(plugin);
        if candidate.is_file() {
            debug!("found plugin {:?} at {:?}", plugin, candidate);
            return Ok(candidate);
        }
    }
    Err(NetchainError::PluginNotFound {
        name: plugin.to_string(),
        paths: paths.iter().map(|p| p.display().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_path_errors() {
        assert!(matches!(
            find_in_path("", &[PathBuf::from("/tmp")]),
            Err(NetchainError::NoPluginName)
        ));
        assert!(matches!(find_in_path("bridge", &[]), Err(NetchainError::NoPaths)));
        let err = find_in_path("bridge", &[PathBuf::from("/nonexistent/netchain")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to find plugin \"bridge\" in path [\"/nonexistent/netchain\"]"
        );
    }

    #[test]
    fn test_limit_takes_the_shorter() {
        let exec = RawExec::with_timeout(Duration::from_secs(10));
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        assert!(exec.limit(&ctx).unwrap() <= Duration::from_secs(1));
        assert_eq!(
            exec.limit(&Context::background()),
            Some(Duration::from_secs(10))
        );
        assert_eq!(RawExec::new().limit(&Context::background()), None);
    }

    #[test]
    fn test_handle_plugin_error() {
        let failed = ExitStatus::from_raw(2 << 8);
        match handle_plugin_error(failed, br#"{"code":7,"msg":"bad config"}"#, b"") {
            NetchainError::Plugin(e) => {
                assert_eq!(e.code, 7);
                assert_eq!(e.msg, "bad config");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = handle_plugin_error(failed, b"garbage", b"oops\n");
        assert_eq!(
            err.to_string(),
            "plugin failed (exit code 2) with output: \"garbage\\noops\""
        );

        // SIGKILL
        let killed = ExitStatus::from_raw(9);
        let err = handle_plugin_error(killed, b"", b"");
        assert!(err.to_string().contains("killed by signal 9"), "{}", err);
    }
}
