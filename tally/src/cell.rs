use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;

use crate::atomics::{self, AtomicU64};
use crate::label::LabelSet;
use crate::time::epoch_seconds;

static PANIC_ON_INVALID_ACCESS: AtomicBool = AtomicBool::new(false);

/// Configures how schema-invalid label accesses are handled.
///
/// By default, mutating a metric through an invalid label assignment logs an
/// error and drops the update, so instrumentation bugs can never take down the
/// instrumented program.  Test suites may flip this to `true` to turn those
/// silent drops into panics and surface the bug at its call site.
pub fn set_panic_on_invalid_access(enabled: bool) {
    PANIC_ON_INVALID_ACCESS.store(enabled, Ordering::Release);
}

pub(crate) fn invalid_access(metric: &str, labels: &LabelSet, reason: &str, operation: &str) {
    if PANIC_ON_INVALID_ACCESS.load(Ordering::Acquire) {
        panic!("invalid label access on metric `{metric}` ({labels}) during {operation}: {reason}");
    }

    error!(
        metric,
        labels = %labels,
        operation,
        reason,
        "label assignment does not match the metric's declared schema; dropping update"
    );
}

/// A single measurement slot: an atomically updated 64-bit float value plus
/// the wall-clock time it last changed.
///
/// The value and the timestamp are two independent atomics.  Readers may see
/// a new value with a stale timestamp (or the reverse); the sub-second skew
/// this allows is tolerated by every consumer, and keeping them decoupled
/// keeps mutation lock-free.
pub struct Cell {
    value: AtomicU64,
    last_changed: AtomicU64,
    labels: LabelSet,
}

impl Cell {
    pub(crate) fn new(initial: f64, labels: LabelSet) -> Cell {
        Cell {
            value: atomics::new_f64(initial),
            last_changed: atomics::new_f64(epoch_seconds()),
            labels,
        }
    }

    /// Current value of this cell.
    pub fn value(&self) -> f64 {
        atomics::load_f64(&self.value)
    }

    /// Wall-clock time, in seconds since the Unix epoch, at which this cell
    /// was created or last mutated.
    pub fn last_changed(&self) -> f64 {
        atomics::load_f64(&self.last_changed)
    }

    /// The label assignment this cell was created under.
    ///
    /// Empty for the single cell of a scalar metric.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn touch(&self) {
        atomics::store_f64(&self.last_changed, epoch_seconds());
    }

    pub(crate) fn add(&self, delta: f64) {
        atomics::add_f64(&self.value, delta);
        self.touch();
    }

    pub(crate) fn sub(&self, delta: f64) {
        atomics::sub_f64(&self.value, delta);
        self.touch();
    }

    pub(crate) fn set(&self, value: f64) {
        atomics::swap_f64(&self.value, value);
        self.touch();
    }

    /// Raises the value to `value` if strictly greater.  The timestamp is
    /// only updated when the value actually moved.
    pub(crate) fn raise_to(&self, value: f64) {
        if atomics::max_f64(&self.value, value) {
            self.touch();
        }
    }
}
