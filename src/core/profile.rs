//! core::profile
//!
//! CPU profiling for `--cpu-profile`.
//!
//! # Design
//!
//! A [`Profiler`] starts a [`ProfileSession`]; stopping the session writes
//! the report to the path given at start. The output file is created at
//! start so a bad path fails before any work is done.
//!
//! The default profiler samples with `pprof` and writes a flamegraph SVG.

use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from CPU profiling.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("creating cpu profile '{path}'")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("starting cpu profiler: {0}")]
    Start(String),

    #[error("writing cpu profile '{path}': {message}")]
    Write { path: PathBuf, message: String },

    #[error("cpu profiling is not supported on this platform")]
    Unsupported,
}

/// Starts profiling sessions.
pub trait Profiler {
    /// Start sampling; the report goes to `path` when the session stops.
    fn start(&self, path: &Path) -> Result<Box<dyn ProfileSession>, ProfileError>;
}

/// A running profile.
pub trait ProfileSession {
    /// Stop sampling and write the report.
    fn stop(self: Box<Self>) -> Result<(), ProfileError>;
}

/// Sampling profiler backed by `pprof`.
#[derive(Debug, Clone, Copy)]
pub struct PprofProfiler {
    /// Samples per second
    pub frequency: i32,
}

impl Default for PprofProfiler {
    fn default() -> Self {
        Self { frequency: 1000 }
    }
}

fn create_output(path: &Path) -> Result<File, ProfileError> {
    File::create(path).map_err(|e| ProfileError::Create {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
mod sampling {
    use super::*;
    use pprof::{ProfilerGuard, ProfilerGuardBuilder};

    pub(super) struct PprofSession {
        pub(super) guard: ProfilerGuard<'static>,
        pub(super) file: File,
        pub(super) path: PathBuf,
    }

    impl ProfileSession for PprofSession {
        fn stop(self: Box<Self>) -> Result<(), ProfileError> {
            let PprofSession { guard, file, path } = *self;
            let write_err = |message: String| ProfileError::Write {
                path: path.clone(),
                message,
            };

            let report = guard.report().build().map_err(|e| write_err(e.to_string()))?;
            report.flamegraph(file).map_err(|e| write_err(e.to_string()))?;
            tracing::debug!("cpu profile written to {}", path.display());
            Ok(())
        }
    }

    pub(super) fn start(frequency: i32, path: &Path) -> Result<Box<dyn ProfileSession>, ProfileError> {
        let file = create_output(path)?;
        let guard = ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .map_err(|e| ProfileError::Start(e.to_string()))?;

        Ok(Box::new(PprofSession {
            guard,
            file,
            path: path.to_path_buf(),
        }))
    }
}

impl Profiler for PprofProfiler {
    #[cfg(unix)]
    fn start(&self, path: &Path) -> Result<Box<dyn ProfileSession>, ProfileError> {
        sampling::start(self.frequency, path)
    }

    #[cfg(not(unix))]
    fn start(&self, path: &Path) -> Result<Box<dyn ProfileSession>, ProfileError> {
        let _ = create_output(path)?;
        Err(ProfileError::Unsupported)
    }
}
