//! Shell Command Execution
//!
//! Runs one command through `/bin/sh -c` with both output streams piped, and
//! accounts for the child's resources with `wait4(2)`. Capture threads drain
//! the pipes while the child runs so it can never block on a full pipe, which
//! would distort the timing measurement.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;
use thiserror::Error;

/// Errors from launching or reaping a child process
#[derive(Debug, Error)]
pub enum CommandError {
    /// The shell could not be spawned.
    #[error("failed to spawn '/bin/sh -c {command}': {source}")]
    Spawn {
        /// The command string passed to the shell
        command: String,
        /// Underlying OS error
        source: std::io::Error,
    },
    /// `wait4(2)` failed.
    #[error("wait4 failed for '{command}': {source}")]
    Wait {
        /// The command string passed to the shell
        command: String,
        /// Underlying OS error
        source: std::io::Error,
    },
}

/// Everything observed about one executed command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Exit code; 128+signal when terminated by a signal
    pub exit_code: i32,
    /// Wall-clock duration in seconds, measured around the shell invocation
    pub wall_seconds: f64,
    /// Child user CPU time in seconds (`ru_utime`)
    pub user_seconds: f64,
    /// Child system CPU time in seconds (`ru_stime`)
    pub system_seconds: f64,
    /// Peak resident set size in mebibytes (`ru_maxrss`)
    pub max_rss_mib: f64,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutcome {
    /// Whether the command exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Execute `command` via `/bin/sh -c` and collect its measurements.
///
/// `cwd` sets the child's working directory; `env` is overlaid on the
/// engine's environment, delta values winning on collision. A non-zero exit
/// is not an error here: callers inspect [`CommandOutcome::success`].
pub fn run_command(
    command: &str,
    cwd: Option<&Path>,
    env: &[(String, String)],
) -> Result<CommandOutcome, CommandError> {
    tracing::debug!(command, "executing");
    let mut shell = Command::new("/bin/sh");
    shell
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        shell.current_dir(dir);
    }
    for (key, value) in env {
        shell.env(key, value);
    }

    let start = Instant::now();
    let mut child = shell.spawn().map_err(|source| CommandError::Spawn {
        command: command.to_string(),
        source,
    })?;

    let stdout = drain(child.stdout.take().expect("stdout is piped"));
    let stderr = drain(child.stderr.take().expect("stderr is piped"));

    let (status, rusage) = wait4(child.id() as libc::pid_t).map_err(|source| {
        CommandError::Wait {
            command: command.to_string(),
            source,
        }
    })?;
    let wall_seconds = start.elapsed().as_secs_f64();

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    let exit_code = decode_wait_status(status);
    if exit_code != 0 {
        tracing::error!(command, exit_code, "subprocess exited abnormally");
    }

    Ok(CommandOutcome {
        exit_code,
        wall_seconds,
        user_seconds: timeval_seconds(rusage.ru_utime),
        system_seconds: timeval_seconds(rusage.ru_stime),
        // ru_maxrss is reported in KiB on Linux
        max_rss_mib: rusage.ru_maxrss as f64 / 1024.0,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Reap `pid`, retrying on `EINTR`, and return its wait status and rusage.
fn wait4(pid: libc::pid_t) -> std::io::Result<(libc::c_int, libc::rusage)> {
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is a plain-old-data struct; zeroing all bytes is a valid
    // initial state.
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: pid refers to our unreaped child and the out-pointers are
        // valid for the duration of the call.
        let ret = unsafe { libc::wait4(pid, &mut status, 0, &mut rusage) };
        if ret == pid {
            return Ok((status, rusage));
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

fn decode_wait_status(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        // Shell convention for signal deaths
        128 + libc::WTERMSIG(status)
    } else {
        -1
    }
}

fn timeval_seconds(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_and_exit_code() {
        let out = run_command("echo hello", None, &[]).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "");
        assert!(out.wall_seconds > 0.0);
    }

    #[test]
    fn test_captures_stderr() {
        let out = run_command("echo oops >&2; exit 3", None, &[]).unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
        assert_eq!(out.stderr, "oops\n");
    }

    #[test]
    fn test_env_overlay() {
        let env = vec![("BENCHALOT_TEST_VAR".to_string(), "42".to_string())];
        let out = run_command("echo $BENCHALOT_TEST_VAR", None, &env).unwrap();
        assert_eq!(out.stdout, "42\n");
    }

    #[test]
    fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command("pwd", Some(dir.path()), &[]).unwrap();
        let printed = out.stdout.trim_end();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(printed).canonicalize().unwrap(),
            expected
        );
    }

    #[test]
    fn test_multiline_command() {
        let out = run_command("echo line1\necho line2", None, &[]).unwrap();
        assert_eq!(out.stdout, "line1\nline2\n");
    }

    #[test]
    fn test_resource_accounting_is_sane() {
        let out = run_command("true", None, &[]).unwrap();
        assert!(out.user_seconds >= 0.0);
        assert!(out.system_seconds >= 0.0);
        assert!(out.max_rss_mib >= 0.0);
    }

    #[test]
    fn test_large_output_does_not_deadlock() {
        // Output larger than any pipe buffer; the drain threads must keep up.
        let out = run_command("yes x | head -c 1048576", None, &[]).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.len(), 1_048_576);
    }
}
