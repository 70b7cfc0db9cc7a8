use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::warn;

use crate::cell::{invalid_access, Cell};
use crate::label::{IntoLabels, LabelKind, LabelSchema, LabelSet};
use crate::SharedString;

/// Upper bound on the number of cells a grouped metric will hold.
///
/// When a cell access pushes a group past this bound, the least recently
/// changed cell other than the one being returned is evicted.
pub const MAX_CELLS: usize = 200;

const UNREGISTERED: &str = "<unregistered>";

/// The kind of a metric.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can move in either direction.
    Gauge,
}

impl MetricKind {
    /// The kind as it appears in rendered output.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

struct GroupedCells {
    schema: LabelSchema,
    initial: f64,
    cells: Mutex<HashMap<LabelSet, Arc<Cell>>>,
}

impl GroupedCells {
    fn new(schema: LabelSchema, initial: f64) -> GroupedCells {
        GroupedCells { schema, initial, cells: Mutex::new(HashMap::new()) }
    }

    fn lookup_or_create(&self, labels: LabelSet, metric: &str) -> Arc<Cell> {
        let mut cells = self.cells.lock();
        if let Some(cell) = cells.get(&labels) {
            return Arc::clone(cell);
        }

        let cell = Arc::new(Cell::new(self.initial, labels.clone()));
        cells.insert(labels, Arc::clone(&cell));

        if cells.len() > MAX_CELLS {
            // O(n) scan, but the bound is small and overflowing it is rare.
            let victim = cells
                .iter()
                .filter(|(_, candidate)| !Arc::ptr_eq(candidate, &cell))
                .min_by(|a, b| a.1.last_changed().total_cmp(&b.1.last_changed()))
                .map(|(labels, _)| labels.clone());
            if let Some(victim) = victim {
                cells.remove(&victim);
                warn!(
                    metric,
                    labels = %victim,
                    cell_count = cells.len(),
                    "cell limit exceeded; evicted the least recently changed cell"
                );
            }
        }

        cell
    }
}

enum Storage {
    Scalar(Arc<Cell>),
    Grouped(GroupedCells),
}

struct MetricCore {
    kind: MetricKind,
    name: OnceLock<SharedString>,
    storage: Storage,
}

impl MetricCore {
    fn scalar(kind: MetricKind, initial: f64) -> MetricCore {
        MetricCore {
            kind,
            name: OnceLock::new(),
            storage: Storage::Scalar(Arc::new(Cell::new(initial, LabelSet::empty()))),
        }
    }

    fn grouped(kind: MetricKind, schema: LabelSchema, initial: f64) -> MetricCore {
        MetricCore {
            kind,
            name: OnceLock::new(),
            storage: Storage::Grouped(GroupedCells::new(schema, initial)),
        }
    }

    fn display_name(&self) -> SharedString {
        self.name.get().cloned().unwrap_or(SharedString::Borrowed(UNREGISTERED))
    }

    /// Sets the metric's name, which can only happen once.
    ///
    /// Setting the same name again is fine; a different name returns the name
    /// the metric already carries.
    fn set_name(&self, name: &str) -> Result<(), SharedString> {
        let _ = self.name.set(SharedString::from(name.to_owned()));
        match self.name.get() {
            Some(existing) if &**existing != name => Err(existing.clone()),
            _ => Ok(()),
        }
    }

    fn cell_access(&self, labels: LabelSet) -> CellAccess {
        match &self.storage {
            Storage::Scalar(cell) => {
                if labels.is_empty() {
                    CellAccess::Live { metric: self.display_name(), cell: Arc::clone(cell) }
                } else {
                    CellAccess::Invalid {
                        metric: self.display_name(),
                        labels,
                        reason: "scalar metric does not accept labels".to_owned(),
                    }
                }
            }
            Storage::Grouped(group) => match group.schema.validate(&labels) {
                Ok(()) => {
                    let name = self.display_name();
                    let cell = group.lookup_or_create(labels, &name);
                    CellAccess::Live { metric: name, cell }
                }
                Err(mismatch) => CellAccess::Invalid {
                    metric: self.display_name(),
                    labels,
                    reason: mismatch.to_string(),
                },
            },
        }
    }

    /// Non-creating lookup.  Silent on every kind of miss.
    fn existing_cell(&self, labels: &LabelSet) -> Option<Arc<Cell>> {
        match &self.storage {
            Storage::Scalar(cell) => labels.is_empty().then(|| Arc::clone(cell)),
            Storage::Grouped(group) => {
                group.schema.validate(labels).ok()?;
                group.cells.lock().get(labels).map(Arc::clone)
            }
        }
    }

    fn cells(&self) -> Vec<Arc<Cell>> {
        match &self.storage {
            Storage::Scalar(cell) => vec![Arc::clone(cell)],
            Storage::Grouped(group) => group.cells.lock().values().map(Arc::clone).collect(),
        }
    }
}

/// Resolution of a labeled cell access: either the live cell, or a sentinel
/// for a schema-invalid assignment whose mutations log and no-op.
enum CellAccess {
    Live { metric: SharedString, cell: Arc<Cell> },
    Invalid { metric: SharedString, labels: LabelSet, reason: String },
}

/// An untyped handle to a metric of either kind.
///
/// This is what registries store and what exporters walk.  It is a cheap
/// clone of the same shared state the typed [`Counter`]/[`Gauge`] handles
/// point at.
#[derive(Clone)]
pub struct Metric {
    core: Arc<MetricCore>,
}

impl Metric {
    /// The kind of this metric.
    pub fn kind(&self) -> MetricKind {
        self.core.kind
    }

    /// The name this metric was registered under, if it has been registered.
    pub fn name(&self) -> Option<&str> {
        self.core.name.get().map(|name| name.as_ref())
    }

    /// Whether this metric is grouped (declares labels) or scalar.
    pub fn is_grouped(&self) -> bool {
        matches!(self.core.storage, Storage::Grouped(_))
    }

    /// A point-in-time snapshot of this metric's cells.
    ///
    /// Scalar metrics yield their single cell.  For grouped metrics the
    /// group lock is held only long enough to copy out the cell references.
    pub fn cells(&self) -> Vec<Arc<Cell>> {
        self.core.cells()
    }

    /// An identifier unique to this metric's shared state for the life of the
    /// process.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.core) as usize
    }

    pub(crate) fn set_name(&self, name: &str) -> Result<(), SharedString> {
        self.core.set_name(name)
    }

    pub(crate) fn schema(&self) -> Option<&LabelSchema> {
        match &self.core.storage {
            Storage::Scalar(_) => None,
            Storage::Grouped(group) => Some(&group.schema),
        }
    }

    pub(crate) fn existing_cell(&self, labels: &LabelSet) -> Option<Arc<Cell>> {
        self.core.existing_cell(labels)
    }

    pub(crate) fn scalar_cell(&self) -> Option<&Arc<Cell>> {
        match &self.core.storage {
            Storage::Scalar(cell) => Some(cell),
            Storage::Grouped(_) => None,
        }
    }
}

/// A monotonic counter.
///
/// Cheaply cloneable; all clones share the same cells.
#[derive(Clone)]
pub struct Counter {
    core: Arc<MetricCore>,
}

impl Counter {
    /// Creates a scalar counter: a single cell, no labels.
    pub fn scalar() -> Counter {
        Counter { core: Arc::new(MetricCore::scalar(MetricKind::Counter, 0.0)) }
    }

    /// Creates a grouped counter with the given label schema.
    ///
    /// Cells are created lazily on first access and start at zero.
    pub fn grouped<I, K>(schema: I) -> Counter
    where
        I: IntoIterator<Item = (K, LabelKind)>,
        K: Into<SharedString>,
    {
        let schema = LabelSchema::from_entries(schema);
        Counter { core: Arc::new(MetricCore::grouped(MetricKind::Counter, schema, 0.0)) }
    }

    /// Increments the scalar cell.  Shorthand for `self.cell(()).increment(..)`.
    pub fn increment(&self, value: f64) {
        self.cell(()).increment(value);
    }

    /// Raises the scalar cell to an absolute value, for mirroring an external
    /// monotonic counter.  Shorthand for `self.cell(()).absolute(..)`.
    pub fn absolute(&self, value: f64) {
        self.cell(()).absolute(value);
    }

    /// Resolves the cell for a label assignment, creating it if needed.
    ///
    /// An assignment that does not match the declared schema yields a
    /// sentinel cell whose mutations log an error and do nothing.
    pub fn cell<L: IntoLabels>(&self, labels: L) -> CounterCell {
        CounterCell { access: self.core.cell_access(labels.into_labels()) }
    }

    /// Resolves the cell for a label assignment without creating it.
    pub fn cell_if_exists<L: IntoLabels>(&self, labels: L) -> Option<Arc<Cell>> {
        self.core.existing_cell(&labels.into_labels())
    }

    /// An untyped handle to this counter, for registration.
    pub fn as_metric(&self) -> Metric {
        Metric { core: Arc::clone(&self.core) }
    }
}

/// A gauge.
///
/// Cheaply cloneable; all clones share the same cells.
#[derive(Clone)]
pub struct Gauge {
    core: Arc<MetricCore>,
}

impl Gauge {
    /// Creates a scalar gauge starting at zero.
    pub fn scalar() -> Gauge {
        Gauge::scalar_with(0.0)
    }

    /// Creates a scalar gauge with an initial value.
    pub fn scalar_with(initial: f64) -> Gauge {
        Gauge { core: Arc::new(MetricCore::scalar(MetricKind::Gauge, initial)) }
    }

    /// Creates a grouped gauge with the given label schema.  Cells start at
    /// zero.
    pub fn grouped<I, K>(schema: I) -> Gauge
    where
        I: IntoIterator<Item = (K, LabelKind)>,
        K: Into<SharedString>,
    {
        Gauge::grouped_with(0.0, schema)
    }

    /// Creates a grouped gauge whose cells start at `initial`.
    pub fn grouped_with<I, K>(initial: f64, schema: I) -> Gauge
    where
        I: IntoIterator<Item = (K, LabelKind)>,
        K: Into<SharedString>,
    {
        let schema = LabelSchema::from_entries(schema);
        Gauge { core: Arc::new(MetricCore::grouped(MetricKind::Gauge, schema, initial)) }
    }

    /// Increments the scalar cell.
    pub fn increment(&self, value: f64) {
        self.cell(()).increment(value);
    }

    /// Decrements the scalar cell.
    pub fn decrement(&self, value: f64) {
        self.cell(()).decrement(value);
    }

    /// Sets the scalar cell.
    pub fn set(&self, value: f64) {
        self.cell(()).set(value);
    }

    /// Resolves the cell for a label assignment, creating it if needed.
    ///
    /// An assignment that does not match the declared schema yields a
    /// sentinel cell whose mutations log an error and do nothing.
    pub fn cell<L: IntoLabels>(&self, labels: L) -> GaugeCell {
        GaugeCell { access: self.core.cell_access(labels.into_labels()) }
    }

    /// Resolves the cell for a label assignment without creating it.
    pub fn cell_if_exists<L: IntoLabels>(&self, labels: L) -> Option<Arc<Cell>> {
        self.core.existing_cell(&labels.into_labels())
    }

    /// An untyped handle to this gauge, for registration.
    pub fn as_metric(&self) -> Metric {
        Metric { core: Arc::clone(&self.core) }
    }
}

impl From<&Counter> for Metric {
    fn from(counter: &Counter) -> Metric {
        counter.as_metric()
    }
}

impl From<Counter> for Metric {
    fn from(counter: Counter) -> Metric {
        Metric { core: counter.core }
    }
}

impl From<&Gauge> for Metric {
    fn from(gauge: &Gauge) -> Metric {
        gauge.as_metric()
    }
}

impl From<Gauge> for Metric {
    fn from(gauge: Gauge) -> Metric {
        Metric { core: gauge.core }
    }
}

/// A resolved counter cell.
pub struct CounterCell {
    access: CellAccess,
}

impl CounterCell {
    /// Adds a non-negative amount to the counter.
    ///
    /// A negative amount is dropped with a warning; counters only move up.
    pub fn increment(&self, value: f64) {
        match &self.access {
            CellAccess::Live { metric, cell } => {
                if value < 0.0 {
                    warn!(
                        metric = %metric,
                        value,
                        "counter increments must be non-negative; dropping update"
                    );
                } else {
                    cell.add(value);
                }
            }
            CellAccess::Invalid { metric, labels, reason } => {
                invalid_access(metric, labels, reason, "increment");
            }
        }
    }

    /// Raises the counter to at least `value`.
    ///
    /// This supports mirroring an externally tracked monotonic counter:
    /// multiple callers may race stale reads of the external value, and the
    /// atomic max guarantees the cell never moves backwards.
    pub fn absolute(&self, value: f64) {
        match &self.access {
            CellAccess::Live { cell, .. } => cell.raise_to(value),
            CellAccess::Invalid { metric, labels, reason } => {
                invalid_access(metric, labels, reason, "absolute");
            }
        }
    }
}

/// A resolved gauge cell.
pub struct GaugeCell {
    access: CellAccess,
}

impl GaugeCell {
    /// Adds an amount (of either sign) to the gauge.
    pub fn increment(&self, value: f64) {
        match &self.access {
            CellAccess::Live { cell, .. } => cell.add(value),
            CellAccess::Invalid { metric, labels, reason } => {
                invalid_access(metric, labels, reason, "increment");
            }
        }
    }

    /// Subtracts a non-negative amount from the gauge.
    ///
    /// A negative amount is dropped with a warning, symmetric with counter
    /// increments.
    pub fn decrement(&self, value: f64) {
        match &self.access {
            CellAccess::Live { metric, cell } => {
                if value < 0.0 {
                    warn!(
                        metric = %metric,
                        value,
                        "gauge decrements must be non-negative; dropping update"
                    );
                } else {
                    cell.sub(value);
                }
            }
            CellAccess::Invalid { metric, labels, reason } => {
                invalid_access(metric, labels, reason, "decrement");
            }
        }
    }

    /// Sets the gauge to a value.
    pub fn set(&self, value: f64) {
        match &self.access {
            CellAccess::Live { cell, .. } => cell.set(value),
            CellAccess::Invalid { metric, labels, reason } => {
                invalid_access(metric, labels, reason, "set");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Counter, Gauge, MetricKind, MAX_CELLS};
    use crate::label::LabelKind;
    use crate::labels;

    #[test]
    fn test_scalar_counter_increment() {
        let counter = Counter::scalar();
        counter.increment(1.0);
        counter.increment(2.5);
        assert_eq!(counter.cell_if_exists(()).unwrap().value(), 3.5);
    }

    #[test]
    fn test_negative_increment_is_dropped() {
        let counter = Counter::scalar();
        counter.increment(5.0);
        counter.increment(-1.0);
        assert_eq!(counter.cell_if_exists(()).unwrap().value(), 5.0);
    }

    #[test]
    fn test_absolute_never_moves_backwards() {
        let counter = Counter::scalar();
        counter.absolute(10.0);
        counter.absolute(7.0);
        assert_eq!(counter.cell_if_exists(()).unwrap().value(), 10.0);
        counter.absolute(12.0);
        assert_eq!(counter.cell_if_exists(()).unwrap().value(), 12.0);
    }

    #[test]
    fn test_grouped_cells_are_lazy_and_shared() {
        let counter = Counter::grouped([("action", LabelKind::String)]);
        assert!(counter.as_metric().cells().is_empty());

        counter.cell(labels! { "action" => "get" }).increment(1.0);
        counter.cell(labels! { "action" => "get" }).increment(1.0);
        counter.cell(labels! { "action" => "put" }).increment(1.0);

        let metric = counter.as_metric();
        assert_eq!(metric.cells().len(), 2);
        assert_eq!(
            counter.cell_if_exists(labels! { "action" => "get" }).unwrap().value(),
            2.0
        );
    }

    #[test]
    fn test_invalid_access_creates_no_cell() {
        let counter = Counter::grouped([("action", LabelKind::String)]);
        counter.cell(labels! { "unknown" => "x" }).increment(1.0);
        counter.cell(()).increment(1.0);
        counter.cell(labels! { "action" => 1 }).increment(1.0);
        assert!(counter.as_metric().cells().is_empty());
    }

    #[test]
    fn test_scalar_rejects_labels() {
        let gauge = Gauge::scalar();
        gauge.cell(labels! { "x" => 1 }).set(9.0);
        assert_eq!(gauge.cell_if_exists(()).unwrap().value(), 0.0);
        assert!(gauge.cell_if_exists(labels! { "x" => 1 }).is_none());
    }

    #[test]
    fn test_gauge_moves_both_ways() {
        let gauge = Gauge::scalar_with(10.0);
        gauge.increment(5.0);
        gauge.decrement(2.5);
        assert_eq!(gauge.cell_if_exists(()).unwrap().value(), 12.5);
        gauge.decrement(-100.0);
        assert_eq!(gauge.cell_if_exists(()).unwrap().value(), 12.5);
        gauge.set(-3.0);
        assert_eq!(gauge.cell_if_exists(()).unwrap().value(), -3.0);
    }

    #[test]
    fn test_grouped_gauge_inherits_initial_value() {
        let gauge = Gauge::grouped_with(7.0, [("zone", LabelKind::String)]);
        gauge.cell(labels! { "zone" => "a" }).increment(1.0);
        assert_eq!(gauge.cell_if_exists(labels! { "zone" => "a" }).unwrap().value(), 8.0);
    }

    #[test]
    fn test_cell_limit_evicts_least_recently_changed() {
        let counter = Counter::grouped([("order", LabelKind::Int)]);
        for i in 1..=205i64 {
            counter.cell(labels! { "order" => i }).increment(i as f64);
            // Keep creation timestamps distinct so the eviction order is
            // deterministic.
            std::thread::sleep(std::time::Duration::from_micros(5));
        }

        let metric = counter.as_metric();
        assert_eq!(metric.cells().len(), MAX_CELLS);

        // The oldest cells fell out, one per overflowing insert; the newest
        // insert always survives.
        for i in 1..=5i64 {
            assert!(counter.cell_if_exists(labels! { "order" => i }).is_none());
        }
        for i in 6..=205i64 {
            assert!(counter.cell_if_exists(labels! { "order" => i }).is_some(), "order={i}");
        }
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(MetricKind::Counter.as_str(), "counter");
        assert_eq!(MetricKind::Gauge.as_str(), "gauge");
        assert_eq!(Counter::scalar().as_metric().kind(), MetricKind::Counter);
        assert_eq!(Gauge::scalar().as_metric().kind(), MetricKind::Gauge);
    }
}
