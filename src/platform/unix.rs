use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Outcome of signalling a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    Delivered,
    /// No process in the group exists any more
    Gone,
}

/// Detach the child into a process group of its own
///
/// Signals aimed at the child's group then never reach this process.
pub fn prepare_command(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if set_process_group() != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Check if any member of the process group is alive
pub fn process_group_alive(pgid: u32) -> bool {
    match signal::killpg(to_pid(pgid), None) {
        Ok(()) => true,
        // EPERM means the group exists but is not ours to signal
        Err(errno) => errno == Errno::EPERM,
    }
}

/// Send `signal` to every process of the group
pub fn signal_process_group(pgid: u32, signal: Signal) -> io::Result<SignalDelivery> {
    match signal::killpg(to_pid(pgid), signal) {
        Ok(()) => {
            debug!("pgid={} sent {}", pgid, signal);
            Ok(SignalDelivery::Delivered)
        }
        Err(Errno::ESRCH) => Ok(SignalDelivery::Gone),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Resolve a program name against `PATH`
///
/// Names containing a path separator are returned untouched.
pub fn resolve_executable(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        return Some(PathBuf::from(program));
    }
    which::which(program).ok()
}

fn to_pid(raw: u32) -> Pid {
    Pid::from_raw(raw as libc::pid_t)
}

/// Safely set process group ID
///
/// Encapsulates unsafe setpgid call
unsafe fn set_process_group() -> libc::c_int {
    unsafe { libc::setpgid(0, 0) }
}
