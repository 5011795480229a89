/// Runner - Bounded Subprocess Execution
///
/// **Core Responsibility:**
/// Spawn one fresh process, feed it stdin, capture stdout/stderr into
/// capped buffers and enforce a wall-clock deadline.
///
/// **Deadline Handling:**
/// The child leads its own process group. When the deadline fires the whole
/// group is SIGKILLed, the child is reaped within `kill_grace`, and capture
/// tasks still stuck on a pipe held by an escaped descendant are abandoned
/// with whatever they collected. The call therefore returns no later than
/// `deadline + 2 * kill_grace`.
///
/// **Not This Module's Job:**
/// Deciding whether a non-zero exit is a failure. `RunResult` is returned
/// as-is for the evaluator to classify.

use crate::error::{JudgeError, Result};
use codejudge_common::RunResult;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

const READ_CHUNK: usize = 8 * 1024;

/// Exit code reported when the child could not be reaped at all
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Everything needed to run one bounded process
#[derive(Debug, Clone)]
pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub cwd: &'a Path,
    /// `None` connects stdin to /dev/null
    pub stdin: Option<&'a str>,
    pub deadline: Duration,
    pub output_limit: usize,
    pub kill_grace: Duration,
}

/// Output buffer that stops growing at `limit` but remembers it overflowed
#[derive(Debug, Default)]
pub(crate) struct CappedBuffer {
    data: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub(crate) fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub(crate) fn into_string(self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

type SharedBuffer = Arc<Mutex<CappedBuffer>>;

/// Drain `reader` to EOF, keeping at most the buffer's limit.
/// Reading continues past the cap so the writer never blocks on a full pipe.
fn spawn_capture<R>(mut reader: R, buffer: SharedBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(&chunk[..n]);
                    }
                }
            }
        }
    })
}

fn take_buffer(buffer: &SharedBuffer) -> (String, bool) {
    match buffer.lock() {
        Ok(mut buf) => {
            let data = std::mem::take(&mut buf.data);
            (String::from_utf8_lossy(&data).into_owned(), buf.truncated)
        }
        Err(_) => (String::new(), false),
    }
}

/// Send SIGKILL to the child's whole process group
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        // ESRCH just means the group is already gone
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Whether any process still belongs to the group led by `pid`
#[cfg(unix)]
fn group_alive(pid: u32) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pid as i32), None).is_ok()
}

/// Kill descendants left behind by a leader that has already been reaped.
///
/// Once the leader is reaped its pid is only reserved while group members
/// remain; an empty group's id may already belong to someone else.
#[cfg(unix)]
fn kill_stragglers(pid: Option<u32>) {
    if let Some(pid) = pid.filter(|pid| group_alive(*pid)) {
        kill_process_group(Some(pid));
    }
}

#[cfg(not(unix))]
fn kill_stragglers(_pid: Option<u32>) {}

/// Tears down the process group when a run is dropped before it finishes
struct GroupGuard {
    pid: Option<u32>,
    reaped: bool,
    finished: bool,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            reaped: false,
            finished: false,
        }
    }

    /// Final teardown on the normal path
    fn finish(&mut self) {
        self.finished = true;
        if self.reaped {
            kill_stragglers(self.pid);
        } else {
            kill_process_group(self.pid);
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!(pid = ?self.pid, "Run abandoned; killing process group");
        if self.reaped {
            kill_stragglers(self.pid);
        } else {
            kill_process_group(self.pid);
        }
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(UNKNOWN_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(UNKNOWN_EXIT_CODE)
}

async fn join_within(handle: JoinHandle<()>, grace: Duration) {
    let abort = handle.abort_handle();
    if tokio::time::timeout(grace, handle).await.is_err() {
        abort.abort();
    }
}

fn spawn_stdin_writer(child: &mut Child, input: Option<&str>) -> Option<JoinHandle<()>> {
    let mut stdin = child.stdin.take()?;
    let mut payload = input.unwrap_or_default().to_string();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    Some(tokio::spawn(async move {
        // A program that never reads stdin closes the pipe early; that is fine.
        if let Err(e) = stdin.write_all(payload.as_bytes()).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                tracing::debug!(error = %e, "Failed to write stdin");
            }
        }
        drop(stdin);
    }))
}

/// Run one process to completion or deadline
pub async fn run_process(spec: ProcessSpec<'_>) -> Result<RunResult> {
    let mut command = Command::new(spec.program);
    command
        .args(&spec.args)
        .current_dir(spec.cwd)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    tracing::debug!(
        program = spec.program,
        args = ?spec.args,
        cwd = %spec.cwd.display(),
        deadline_ms = spec.deadline.as_millis() as u64,
        "Spawning process"
    );

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| JudgeError::Spawn {
        program: spec.program.to_string(),
        source,
    })?;
    let pid = child.id();
    let mut guard = GroupGuard::new(pid);

    let stdout_buf: SharedBuffer = Arc::new(Mutex::new(CappedBuffer::new(spec.output_limit)));
    let stderr_buf: SharedBuffer = Arc::new(Mutex::new(CappedBuffer::new(spec.output_limit)));

    let stdout_task = child
        .stdout
        .take()
        .map(|out| spawn_capture(out, stdout_buf.clone()));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| spawn_capture(err, stderr_buf.clone()));
    let stdin_task = spawn_stdin_writer(&mut child, spec.stdin);

    let (status, timed_out) = match tokio::time::timeout(spec.deadline, child.wait()).await {
        Ok(Ok(status)) => (Some(status), false),
        Ok(Err(e)) => {
            guard.finish();
            return Err(JudgeError::Io(e));
        }
        Err(_) => {
            kill_process_group(pid);
            let _ = child.start_kill();
            let status = tokio::time::timeout(spec.kill_grace, child.wait())
                .await
                .ok()
                .and_then(|r| r.ok());
            (status, true)
        }
    };

    guard.reaped = status.is_some();
    // Descendants may outlive a child that exited on its own.
    guard.finish();

    let pending = [stdout_task, stderr_task, stdin_task]
        .into_iter()
        .flatten()
        .map(|task| join_within(task, spec.kill_grace));
    futures_util::future::join_all(pending).await;

    let execution_time_ms = start.elapsed().as_millis() as u64;
    let (stdout, stdout_truncated) = take_buffer(&stdout_buf);
    let (stderr, stderr_truncated) = take_buffer(&stderr_buf);
    let truncated = stdout_truncated || stderr_truncated;

    if timed_out {
        tracing::warn!(
            program = spec.program,
            deadline_ms = spec.deadline.as_millis() as u64,
            elapsed_ms = execution_time_ms,
            "Process exceeded deadline and was killed"
        );
    }
    if truncated {
        tracing::warn!(
            program = spec.program,
            limit = spec.output_limit,
            "Process output truncated"
        );
    }

    Ok(RunResult {
        stdout,
        stderr,
        exit_code: status.map(exit_code).unwrap_or(UNKNOWN_EXIT_CODE),
        timed_out,
        truncated,
        execution_time_ms,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh<'a>(script: &str, cwd: &'a Path, stdin: Option<&'a str>, deadline_ms: u64) -> ProcessSpec<'a> {
        ProcessSpec {
            program: "sh",
            args: vec!["-c".to_string(), script.to_string()],
            cwd,
            stdin,
            deadline: Duration::from_millis(deadline_ms),
            output_limit: 64 * 1024,
            kill_grace: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_capped_buffer() {
        let mut buf = CappedBuffer::new(4);
        buf.push(b"ab");
        assert!(!buf.truncated);
        buf.push(b"cdef");
        assert_eq!(buf.data, b"abcd");
        assert!(buf.truncated);
        buf.push(b"gh");
        assert_eq!(buf.data, b"abcd");
    }

    #[tokio::test]
    async fn test_reaped_group_is_not_signalled() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = Command::new("true").current_dir(dir.path()).process_group(0).spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        assert!(!group_alive(pid));
    }

    #[tokio::test]
    async fn test_echoes_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_process(sh("cat", dir.path(), Some("2 3"), 2000)).await.unwrap();

        assert_eq!(result.stdout, "2 3\n");
        assert_eq!(result.exit_code, 0);
        assert!(!result.timed_out);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_captures_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_process(sh("echo boom >&2; exit 3", dir.path(), None, 2000))
            .await
            .unwrap();

        assert_eq!(result.stderr, "boom\n");
        assert_eq!(result.exit_code, 3);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let result = run_process(sh("cat marker.txt", dir.path(), None, 2000)).await.unwrap();
        assert_eq!(result.stdout, "here");
    }

    #[tokio::test]
    async fn test_program_ignoring_stdin_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let big = "x".repeat(1024 * 1024);

        let result = run_process(sh("echo done", dir.path(), Some(big.as_str()), 2000)).await.unwrap();
        assert_eq!(result.stdout, "done\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_within_grace() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();

        let result = run_process(sh("while :; do :; done", dir.path(), None, 500))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_millis(500 + 500));
    }

    #[tokio::test]
    async fn test_descendant_holding_pipes_does_not_hang() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();

        let result = run_process(sh("sleep 30 & sleep 30", dir.path(), None, 300))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_millis(300 + 500));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_whole_process_tree() {
        let dir = tempfile::tempdir().unwrap();

        let result = run_process(sh("sleep 30 & echo $! > child.pid; wait", dir.path(), None, 300))
            .await
            .unwrap();
        assert!(result.timed_out);

        let pid = std::fs::read_to_string(dir.path().join("child.pid")).unwrap();
        let stat_path = format!("/proc/{}/stat", pid.trim());
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Gone, or a zombie waiting for a reaper that is not us
        match std::fs::read_to_string(&stat_path) {
            Err(_) => {}
            Ok(stat) => {
                let state = stat.rsplit(')').next().unwrap().trim_start().chars().next();
                assert_eq!(state, Some('Z'), "grandchild still alive: {}", stat);
            }
        }
    }

    #[tokio::test]
    async fn test_runaway_output_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = sh("yes", dir.path(), None, 300);
        spec.output_limit = 1024;

        let result = run_process(spec).await.unwrap();

        assert!(result.truncated);
        assert_eq!(result.stdout.len(), 1024);
    }

    #[tokio::test]
    async fn test_large_output_under_cap_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_process(sh("head -c 50000 /dev/zero | tr '\\0' a", dir.path(), None, 2000))
            .await
            .unwrap();

        assert_eq!(result.stdout.len(), 50000);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_signal_exit_maps_to_128_plus_signal() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_process(sh("kill -9 $$", dir.path(), None, 2000)).await.unwrap();

        assert_eq!(result.exit_code, 128 + 9);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec {
            program: "definitely-not-a-real-binary-xyz",
            args: vec![],
            cwd: dir.path(),
            stdin: None,
            deadline: Duration::from_secs(1),
            output_limit: 1024,
            kill_grace: Duration::from_millis(100),
        };

        let err = run_process(spec).await.unwrap_err();
        assert!(matches!(err, JudgeError::Spawn { .. }));
    }
}
