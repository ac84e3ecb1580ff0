//! Ordered tracking of acquired disposable handles

use crate::error::{EffectError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A handle that must be released exactly once
pub trait Disposable: Send + Sync {
    fn dispose(&self) -> Result<()>;
}

impl<F> Disposable for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn dispose(&self) -> Result<()> {
        self()
    }
}

/// Identifier returned by [`ResourceRegistry::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

struct Entry {
    id: ResourceId,
    handle: Arc<dyn Disposable>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

/// Registry of acquired resources, released in reverse acquisition order
///
/// Clones share the same registry. Only the registry disposes handles it owns.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    inner: Arc<RegistryInner>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        match self.inner.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Track a handle; it will be disposed by `release` or `release_all`
    pub fn acquire(&self, handle: Arc<dyn Disposable>) -> ResourceId {
        let id = ResourceId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push(Entry { id, handle });
        debug!(resource = %id, "Resource acquired");
        id
    }

    /// Dispose a single handle; releasing an unknown or already released id is a no-op
    pub fn release(&self, id: ResourceId) -> Result<()> {
        let entry = {
            let mut entries = self.entries();
            entries
                .iter()
                .position(|entry| entry.id == id)
                .map(|index| entries.remove(index))
        };

        match entry {
            Some(entry) => {
                debug!(resource = %id, "Releasing resource");
                entry.handle.dispose().map_err(|e| {
                    warn!(resource = %id, error = %e, "Resource release failed");
                    e
                })
            }
            None => Ok(()),
        }
    }

    /// Dispose every tracked handle, newest first
    ///
    /// All handles are disposed even when some fail; failures are aggregated.
    pub fn release_all(&self) -> Result<()> {
        let entries = std::mem::take(&mut *self.entries());
        if !entries.is_empty() {
            debug!(count = entries.len(), "Releasing all resources");
        }

        let failures: Vec<EffectError> = entries
            .into_iter()
            .rev()
            .filter_map(|entry| match entry.handle.dispose() {
                Ok(()) => None,
                Err(e) => {
                    warn!(resource = %entry.id, error = %e, "Resource release failed");
                    Some(e)
                }
            })
            .collect();

        match EffectError::aggregate_all(failures) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of handles still tracked
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries().iter().any(|entry| entry.id == id)
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("tracked", &self.len())
            .finish()
    }
}
