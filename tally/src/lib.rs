//! Lightweight counters and gauges for long-running server programs.
//!
//! Programs create named [`Counter`]s and [`Gauge`]s, optionally dimensioned
//! by labels, and mutate them from any thread without coordination.  Metrics
//! live in a [`Registry`] (usually the process-wide
//! [default registry](default_registry)), which backends walk to expose the
//! values: a scrape-compatible text renderer and a statsd-style UDP push
//! exporter live in the companion `tally-exporter-*` crates.
//!
//! # Usage
//!
//! ```
//! use tally::{labels, Counter, LabelKind, Registry};
//!
//! let registry = Registry::new();
//!
//! let requests = Counter::grouped([
//!     ("action", LabelKind::String),
//!     ("response_code", LabelKind::Int),
//! ]);
//! registry.register("requests", &requests).expect("metric name is valid and free");
//!
//! // From any thread, on the hot path:
//! requests.cell(labels! { "action" => "get", "response_code" => 200 }).increment(1.0);
//!
//! assert_eq!(
//!     registry.value_of("requests", labels! { "action" => "get", "response_code" => 200 }),
//!     Some(1.0),
//! );
//! ```
//!
//! # Design
//!
//! Mutations are lock-free: each cell is a pair of independent atomics (the
//! value and its last-changed timestamp), so instrumented call sites never
//! block on a reader.  Grouped metrics bound their cell count and evict the
//! least recently changed cell on overflow.  Instrumentation mistakes --
//! wrong labels, negative counter increments -- log and drop rather than
//! crash: the observed program must never be harmed by its own telemetry.

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

use std::borrow::Cow;

/// An allocation-friendly string: either borrowed static or owned.
pub type SharedString = Cow<'static, str>;

mod atomics;
mod cell;
mod global;
mod label;
mod metric;
mod registry;
mod task;
mod time;

pub use self::cell::{set_panic_on_invalid_access, Cell};
pub use self::global::default_registry;
pub use self::label::{IntoLabels, Label, LabelKind, LabelSet, LabelValue};
pub use self::metric::{
    Counter, CounterCell, Gauge, GaugeCell, Metric, MetricKind, MAX_CELLS,
};
pub use self::registry::{publish, MetricSet, Registry, RegistryError};
pub use self::task::PeriodicTask;
pub use self::time::epoch_seconds;
