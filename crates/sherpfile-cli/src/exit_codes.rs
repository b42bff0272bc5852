//! Process exit codes
//!
//! Signal codes follow the shell convention of 128 + signal number.

/// Success - every release converged
pub const SUCCESS: i32 = 0;

/// General error - load, plan or release failure, or nothing matched
pub const ERROR: i32 = 1;

/// Changes detected with `--detailed-exitcode`
pub const CHANGES: i32 = 2;

/// Interrupted by SIGINT
pub const INTERRUPTED: i32 = 130;

/// Terminated by SIGTERM
pub const TERMINATED: i32 = 143;

/// Exit code for a process stopped by `signal`
pub fn for_signal(signal: sherpfile_kube::Signal) -> i32 {
    match signal {
        sherpfile_kube::Signal::Interrupt => INTERRUPTED,
        sherpfile_kube::Signal::Terminate => TERMINATED,
    }
}
