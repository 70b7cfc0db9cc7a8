use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::registry::Registry;

/// The default registry has not been constructed yet.
const UNINITIALIZED: usize = 0;

/// The default registry is currently being constructed.
const INITIALIZING: usize = 1;

/// The default registry is ready and can be read.
const INITIALIZED: usize = 2;

/// Double-checked one-shot storage for the process-wide default registry.
struct DefaultRegistryCell {
    registry: UnsafeCell<Option<Arc<Registry>>>,
    state: AtomicUsize,
}

impl DefaultRegistryCell {
    const fn new() -> Self {
        Self { registry: UnsafeCell::new(None), state: AtomicUsize::new(UNINITIALIZED) }
    }

    fn get_or_init(&self) -> Arc<Registry> {
        loop {
            // Fast path: already initialized, just hand out a reference.
            if self.state.load(Ordering::Acquire) == INITIALIZED {
                // SAFETY: Once the state is `INITIALIZED` the slot has been
                // written and is never written again, so shared reads are
                // safe.
                if let Some(registry) = unsafe { &*self.registry.get() } {
                    return Arc::clone(registry);
                }
            }

            // Try to transition from `UNINITIALIZED` to `INITIALIZING`, which
            // grants exclusive access to construct the registry.  A loser of
            // the race spins until the winner publishes.
            match self.state.compare_exchange(
                UNINITIALIZED,
                INITIALIZING,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // SAFETY: Access is unique because we won the transition
                    // from `UNINITIALIZED` to `INITIALIZING` above.
                    unsafe {
                        self.registry.get().write(Some(Arc::new(Registry::new())));
                    }
                    self.state.store(INITIALIZED, Ordering::Release);
                }
                Err(_) => std::hint::spin_loop(),
            }
        }
    }
}

// SAFETY: The slot is written exactly once, guarded by the state machine
// above; afterwards all access is read-only.
unsafe impl Send for DefaultRegistryCell {}
unsafe impl Sync for DefaultRegistryCell {}

static DEFAULT_REGISTRY: DefaultRegistryCell = DefaultRegistryCell::new();

/// The process-wide default registry, constructed lazily on first use.
///
/// Consumers that do not supply their own registry share this one: the scrape
/// handler renders it and the push exporter scans it unless configured
/// otherwise.  Tests can [`clear`](Registry::clear) it to start fresh.
pub fn default_registry() -> Arc<Registry> {
    DEFAULT_REGISTRY.get_or_init()
}
