//! core::rlimit
//!
//! Open-file limit probe, used for diagnostics only.

/// Current (soft) and maximum (hard) open-file limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFileLimits {
    /// Soft limit
    pub current: u64,
    /// Hard limit
    pub max: u64,
}

impl std::fmt::Display for OpenFileLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "current={} max={}", self.current, self.max)
    }
}

/// Probe the open-file limits of this process.
///
/// Returns `None` when the platform has no notion of the limit or the
/// probe fails; it never fails the caller.
#[cfg(unix)]
pub fn open_file_limits() -> Option<OpenFileLimits> {
    use nix::sys::resource::{getrlimit, Resource};

    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((current, max)) => Some(OpenFileLimits {
            current: current as u64,
            max: max as u64,
        }),
        Err(e) => {
            tracing::debug!("failed to read RLIMIT_NOFILE: {}", e);
            None
        }
    }
}

/// Probe the open-file limits of this process.
#[cfg(not(unix))]
pub fn open_file_limits() -> Option<OpenFileLimits> {
    None
}
