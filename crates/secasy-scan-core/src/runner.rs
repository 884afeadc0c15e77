//! External process execution with a wall-clock limit.
//!
//! A run never fails: non-zero exits are ordinary output, a timeout is the
//! captured output plus [`TIMEOUT_SENTINEL`] on its own line, and a spawn
//! failure becomes a single `<<SPAWN FAILED: ...>>` line. Retrying is the
//! caller's business.
//!
//! On unix stdout and stderr share one pipe, so interleaved lines keep the
//! order the child wrote them in.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Appended on its own line when a process hit its wall-clock limit.
pub const TIMEOUT_SENTINEL: &str = "<<TIMEOUT>>";

/// Prefix of the line returned instead of output when a process cannot be started.
pub const SPAWN_FAILED_PREFIX: &str = "<<SPAWN FAILED: ";

/// Combined stdout+stderr beyond this many bytes is dropped.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// How long to keep draining pipes after killing a timed-out process.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Process group of the child currently being waited on, 0 when idle.
static IN_FLIGHT_PGID: AtomicI32 = AtomicI32::new(0);

/// SIGKILL the process group of the child a runner is currently waiting on.
///
/// Only loads an atomic and calls kill(2), so it may be called from a signal
/// handler right before the process exits.
pub fn kill_in_flight() {
    #[cfg(unix)]
    {
        let pgid = IN_FLIGHT_PGID.load(Ordering::SeqCst);
        if pgid > 0 {
            // SAFETY: kill(2) is async-signal-safe and takes plain integers.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
}

/// Publishes a child's process group in [`IN_FLIGHT_PGID`] until dropped.
struct InFlight(i32);

impl InFlight {
    fn track(child: &Child) -> Self {
        let pgid = i32::try_from(child.id()).unwrap_or(0);
        IN_FLIGHT_PGID.store(pgid, Ordering::SeqCst);
        InFlight(pgid)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let _ = IN_FLIGHT_PGID.compare_exchange(self.0, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// True if `text` is the output of a run that hit its wall-clock limit.
pub fn is_timed_out(text: &str) -> bool {
    text.contains(TIMEOUT_SENTINEL)
}

/// Run `program args...` in `cwd` with `env_extra` layered over the inherited
/// environment, and return its merged stdout and stderr.
pub fn run_command(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    env_extra: &[(&str, &str)],
) -> String {
    run_command_capped(program, args, cwd, timeout, env_extra, DEFAULT_MAX_OUTPUT_BYTES)
}

pub fn run_command_capped(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    env_extra: &[(&str, &str)],
    max_output_bytes: usize,
) -> String {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(cwd).stdin(Stdio::null());
    let merged = match attach_output(&mut cmd) {
        Ok(merged) => merged,
        Err(err) => return spawn_failed(program, &err),
    };
    for (key, value) in env_extra {
        cmd.env(key, value);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        // pgid == pid; kill_process_tree and kill_in_flight rely on it.
        cmd.process_group(0);
    }

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return spawn_failed(program, &err),
    };
    // Closes the parent's copies of the write end so the reader sees EOF.
    drop(cmd);
    let _in_flight = InFlight::track(&child);
    debug!(program = %program.display(), ?args, pid = child.id(), "spawned process");

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    if let Some(reader) = merged {
        spawn_reader(reader, tx.clone());
    }
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx.clone());
    }
    drop(tx);

    let deadline = started.checked_add(timeout);
    let mut out = Vec::new();
    let mut truncated = false;
    let mut timed_out = false;

    loop {
        let wait = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(3600),
        };
        if wait.is_zero() {
            timed_out = true;
            break;
        }
        match rx.recv_timeout(wait) {
            Ok(chunk) => truncated |= append_capped(&mut out, &chunk, max_output_bytes),
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some() {
                    timed_out = true;
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Both pipes closed; the process may still be running.
    if !timed_out {
        timed_out = !wait_until(&mut child, deadline);
    }

    if timed_out {
        kill_process_tree(&mut child);
        loop {
            match rx.recv_timeout(DRAIN_GRACE) {
                Ok(chunk) => truncated |= append_capped(&mut out, &chunk, max_output_bytes),
                Err(_) => break,
            }
        }
        warn!(
            program = %program.display(),
            timeout_secs = timeout.as_secs_f64(),
            "process timed out"
        );
    } else {
        match child.try_wait() {
            Ok(Some(status)) => debug!(
                program = %program.display(),
                exit_code = ?status.code(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "process exited"
            ),
            Ok(None) => {}
            Err(err) => debug!(program = %program.display(), error = %err, "try_wait failed"),
        }
    }

    if truncated {
        warn!(
            program = %program.display(),
            max_output_bytes, "process output truncated"
        );
    }

    let mut text = String::from_utf8_lossy(&out).into_owned();
    if timed_out {
        text.push('\n');
        text.push_str(TIMEOUT_SENTINEL);
        text.push('\n');
    }
    text
}

fn spawn_failed(program: &Path, err: &io::Error) -> String {
    warn!(program = %program.display(), error = %err, "failed to spawn process");
    format!("{SPAWN_FAILED_PREFIX}{}: {err}>>\n", program.display())
}

/// Point stdout and stderr at a single pipe and return its read end.
#[cfg(unix)]
fn attach_output(cmd: &mut Command) -> io::Result<Option<std::fs::File>> {
    use std::os::fd::{FromRawFd as _, OwnedFd};

    let mut fds: [libc::c_int; 2] = [-1, -1];
    // SAFETY: pipe(2) writes two fresh descriptors into `fds`.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and nothing else owns them.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in fds {
        // SAFETY: fcntl(2) on descriptors owned above.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    let write_err = write.try_clone()?;
    cmd.stdout(Stdio::from(write)).stderr(Stdio::from(write_err));
    Ok(Some(std::fs::File::from(read)))
}

#[cfg(not(unix))]
fn attach_output(cmd: &mut Command) -> io::Result<Option<std::fs::File>> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    Ok(None)
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R, tx: Sender<Vec<u8>>) {
    std::thread::spawn(move || {
        let mut tmp = [0u8; 8192];
        loop {
            match reader.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(tmp[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

/// Returns true if truncation happened.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let remaining = cap.saturating_sub(buf.len());
    if chunk.len() <= remaining {
        buf.extend_from_slice(chunk);
        false
    } else {
        buf.extend_from_slice(&chunk[..remaining]);
        true
    }
}

/// Wait for exit until `deadline`. Returns false if the deadline passed first.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> bool {
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => return true,
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill(2) takes plain integers; a negative pid targets the
            // process group created for this child by `process_group(0)`.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
