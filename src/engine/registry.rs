//! engine::registry
//!
//! Creation and shutdown of the per-process engines.
//!
//! # Invariants
//!
//! - Each engine is created at most once; later calls return the cached
//!   handle.
//! - Each created engine is shut down at most once, image engine first.
//! - Shutting down a registry that never created an engine is a no-op.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{ContainerEngine, EngineError, EngineFactory, EngineOptions, ImageEngine};

/// One engine slot.
struct Slot<T: ?Sized> {
    handle: Option<Arc<T>>,
    shut_down: bool,
}

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self {
            handle: None,
            shut_down: false,
        }
    }
}

/// Owns the image and container engines for one invocation.
pub struct EngineRegistry {
    factory: Arc<dyn EngineFactory>,
    image: Mutex<Slot<dyn ImageEngine>>,
    container: Mutex<Slot<dyn ContainerEngine>>,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("image", &self.image_engine_created())
            .field("container", &self.container_engine_created())
            .finish()
    }
}

/// Lock a slot, recovering from a poisoned mutex.
fn lock<T: ?Sized>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The live handle in `slot`, if any. The lock is not held while the
/// factory runs.
fn cached<T: ?Sized>(
    slot: &Mutex<Slot<T>>,
    kind: &'static str,
) -> Result<Option<Arc<T>>, EngineError> {
    let slot = lock(slot);
    if slot.shut_down {
        return Err(EngineError::ShutDown(kind));
    }
    Ok(slot.handle.clone())
}

/// Store a freshly created handle. A handle stored first wins.
fn store<T: ?Sized>(
    slot: &Mutex<Slot<T>>,
    kind: &'static str,
    handle: Arc<T>,
) -> Result<Arc<T>, EngineError> {
    let mut slot = lock(slot);
    if slot.shut_down {
        return Err(EngineError::ShutDown(kind));
    }
    if let Some(existing) = &slot.handle {
        return Ok(Arc::clone(existing));
    }
    slot.handle = Some(Arc::clone(&handle));
    Ok(handle)
}

impl EngineRegistry {
    /// Create an empty registry backed by `factory`.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            image: Mutex::new(Slot::default()),
            container: Mutex::new(Slot::default()),
        }
    }

    /// Get the image engine, creating it on first use.
    pub async fn image_engine(
        &self,
        options: &EngineOptions,
    ) -> Result<Arc<dyn ImageEngine>, EngineError> {
        if let Some(handle) = cached(&self.image, "image")? {
            return Ok(handle);
        }

        tracing::debug!("creating image engine for {}", options.command);
        let handle = self.factory.image_engine(options).await?;
        store(&self.image, "image", handle)
    }

    /// Get the container engine, creating it on first use.
    pub async fn container_engine(
        &self,
        options: &EngineOptions,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        if let Some(handle) = cached(&self.container, "container")? {
            return Ok(handle);
        }

        tracing::debug!("creating container engine for {}", options.command);
        let handle = self.factory.container_engine(options).await?;
        store(&self.container, "container", handle)
    }

    /// The container engine, if it was created and is still live.
    pub fn container(&self) -> Option<Arc<dyn ContainerEngine>> {
        let slot = lock(&self.container);
        if slot.shut_down {
            return None;
        }
        slot.handle.clone()
    }

    /// The image engine, if it was created and is still live.
    pub fn image(&self) -> Option<Arc<dyn ImageEngine>> {
        let slot = lock(&self.image);
        if slot.shut_down {
            return None;
        }
        slot.handle.clone()
    }

    /// Whether the image engine was ever created.
    pub fn image_engine_created(&self) -> bool {
        lock(&self.image).handle.is_some()
    }

    /// Whether the container engine was ever created.
    pub fn container_engine_created(&self) -> bool {
        lock(&self.container).handle.is_some()
    }

    /// Shut down the image engine, then the container engine.
    ///
    /// Engines that were never created, or were already shut down, are
    /// skipped. Failures do not stop the second shutdown; all of them are
    /// returned.
    pub async fn shutdown(&self, force: bool) -> Vec<EngineError> {
        let mut errors = Vec::new();

        let image = {
            let mut slot = lock(&self.image);
            let handle = if slot.shut_down { None } else { slot.handle.clone() };
            slot.shut_down = true;
            handle
        };
        if let Some(engine) = image {
            if let Err(e) = engine.shutdown(force).await {
                errors.push(e);
            }
        }

        let container = {
            let mut slot = lock(&self.container);
            let handle = if slot.shut_down { None } else { slot.handle.clone() };
            slot.shut_down = true;
            handle
        };
        if let Some(engine) = container {
            if let Err(e) = engine.shutdown(force).await {
                errors.push(e);
            }
        }

        errors
    }
}
