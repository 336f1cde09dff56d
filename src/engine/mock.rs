//! engine::mock
//!
//! Recording engines for deterministic testing.
//!
//! # Design
//!
//! A [`MockEngineFactory`] hands out mock image and container engines that
//! share one event log. Tests configure failures up front, run a command,
//! and then inspect the log to check what was created, executed and shut
//! down, and in which order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use berth::engine::mock::{MockEngineFactory, MockEvent};
//! use berth::engine::EngineRegistry;
//!
//! let factory = MockEngineFactory::new().with_exit_code(3);
//! let registry = EngineRegistry::new(Arc::new(factory.clone()));
//! assert!(factory.events().is_empty());
//! assert!(!registry.container_engine_created());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    ContainerEngine, EngineError, EngineFactory, EngineInfo, EngineMode, EngineOptions,
    ExecOptions, ExecReport, ImageEngine,
};

/// Recorded engine activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    ImageCreated,
    ContainerCreated,
    Exec {
        container: Option<String>,
        options: ExecOptions,
    },
    RootlessSetup {
        no_move_process: bool,
    },
    ImageShutdown,
    ContainerShutdown,
}

/// Which operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    ImageCreate,
    ContainerCreate,
    Rootless,
    ImageShutdown,
    ContainerShutdown,
}

type ExecFailure = Arc<dyn Fn() -> EngineError + Send + Sync>;

/// Shared state behind every mock handed out by one factory.
#[derive(Default)]
struct MockInner {
    events: Vec<MockEvent>,
    fail_on: Vec<FailOn>,
    exit_code: i32,
    exec_failure: Option<ExecFailure>,
    forced_shutdowns: usize,
}

/// Factory producing recording engines.
///
/// Thread-safe via internal `Arc<Mutex<...>>`; clones share state.
#[derive(Clone, Default)]
pub struct MockEngineFactory {
    inner: Arc<Mutex<MockInner>>,
}

impl std::fmt::Debug for MockEngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngineFactory")
            .field("events", &self.events())
            .finish()
    }
}

impl MockEngineFactory {
    /// Create a factory whose engines succeed at everything.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fail(self, op: FailOn) -> Self {
        self.state().fail_on.push(op);
        self
    }

    /// Fail creating the image engine.
    pub fn fail_image_create(self) -> Self {
        self.fail(FailOn::ImageCreate)
    }

    /// Fail creating the container engine.
    pub fn fail_container_create(self) -> Self {
        self.fail(FailOn::ContainerCreate)
    }

    /// Fail rootless setup.
    pub fn fail_rootless(self) -> Self {
        self.fail(FailOn::Rootless)
    }

    /// Fail shutting down the image engine.
    pub fn fail_image_shutdown(self) -> Self {
        self.fail(FailOn::ImageShutdown)
    }

    /// Fail shutting down the container engine.
    pub fn fail_container_shutdown(self) -> Self {
        self.fail(FailOn::ContainerShutdown)
    }

    /// Exit code reported by successful execs.
    pub fn with_exit_code(self, code: i32) -> Self {
        self.state().exit_code = code;
        self
    }

    /// Make every exec fail with the error built by `f`.
    pub fn fail_exec_with<F>(self, f: F) -> Self
    where
        F: Fn() -> EngineError + Send + Sync + 'static,
    {
        self.state().exec_failure = Some(Arc::new(f));
        self
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    /// Number of times `event` was recorded.
    pub fn count(&self, event: &MockEvent) -> usize {
        self.state().events.iter().filter(|e| *e == event).count()
    }

    /// Recorded execs.
    pub fn execs(&self) -> Vec<(Option<String>, ExecOptions)> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Exec { container, options } => {
                    Some((container.clone(), options.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Number of engine shutdowns requested with `force` set.
    pub fn forced_shutdowns(&self) -> usize {
        self.state().forced_shutdowns
    }

    /// Shutdown events in the order they happened.
    pub fn shutdown_order(&self) -> Vec<MockEvent> {
        self.state()
            .events
            .iter()
            .filter(|e| matches!(e, MockEvent::ImageShutdown | MockEvent::ContainerShutdown))
            .cloned()
            .collect()
    }

    fn record(&self, event: MockEvent) {
        self.state().events.push(event);
    }

    fn record_shutdown(&self, event: MockEvent, force: bool) {
        let mut state = self.state();
        state.events.push(event);
        if force {
            state.forced_shutdowns += 1;
        }
    }

    fn fails(&self, op: FailOn) -> bool {
        self.state().fail_on.contains(&op)
    }

    fn info() -> EngineInfo {
        EngineInfo {
            mode: EngineMode::Local,
            endpoint: "mock".to_string(),
        }
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn image_engine(
        &self,
        _options: &EngineOptions,
    ) -> Result<Arc<dyn ImageEngine>, EngineError> {
        if self.fails(FailOn::ImageCreate) {
            return Err(EngineError::Setup("mock image engine".to_string()));
        }
        self.record(MockEvent::ImageCreated);
        Ok(Arc::new(MockImageEngine {
            factory: self.clone(),
        }))
    }

    async fn container_engine(
        &self,
        _options: &EngineOptions,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        if self.fails(FailOn::ContainerCreate) {
            return Err(EngineError::Setup("mock container engine".to_string()));
        }
        self.record(MockEvent::ContainerCreated);
        Ok(Arc::new(MockContainerEngine {
            factory: self.clone(),
        }))
    }
}

/// Recording image engine.
#[derive(Debug, Clone)]
pub struct MockImageEngine {
    factory: MockEngineFactory,
}

#[async_trait]
impl ImageEngine for MockImageEngine {
    fn info(&self) -> EngineInfo {
        MockEngineFactory::info()
    }

    async fn shutdown(&self, force: bool) -> Result<(), EngineError> {
        self.factory.record_shutdown(MockEvent::ImageShutdown, force);
        if self.factory.fails(FailOn::ImageShutdown) {
            return Err(EngineError::Setup("mock image shutdown".to_string()));
        }
        Ok(())
    }
}

/// Recording container engine.
#[derive(Debug, Clone)]
pub struct MockContainerEngine {
    factory: MockEngineFactory,
}

#[async_trait]
impl ContainerEngine for MockContainerEngine {
    fn info(&self) -> EngineInfo {
        MockEngineFactory::info()
    }

    async fn exec(
        &self,
        name_or_id: Option<&str>,
        options: &ExecOptions,
    ) -> Result<ExecReport, EngineError> {
        self.factory.record(MockEvent::Exec {
            container: name_or_id.map(str::to_string),
            options: options.clone(),
        });

        let (failure, exit_code) = {
            let state = self.factory.state();
            (state.exec_failure.clone(), state.exit_code)
        };
        match failure {
            Some(f) => Err(f()),
            None => Ok(ExecReport { exit_code }),
        }
    }

    async fn setup_rootless(&self, no_move_process: bool) -> Result<(), EngineError> {
        self.factory
            .record(MockEvent::RootlessSetup { no_move_process });
        if self.factory.fails(FailOn::Rootless) {
            return Err(EngineError::Setup("mock rootless".to_string()));
        }
        Ok(())
    }

    async fn shutdown(&self, force: bool) -> Result<(), EngineError> {
        self.factory.record_shutdown(MockEvent::ContainerShutdown, force);
        if self.factory.fails(FailOn::ContainerShutdown) {
            return Err(EngineError::Setup("mock container shutdown".to_string()));
        }
        Ok(())
    }
}
