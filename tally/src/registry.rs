use std::collections::BTreeMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::global::default_registry;
use crate::label::IntoLabels;
use crate::metric::Metric;
use crate::SharedString;

const MAX_NAME_LEN: usize = 200;

/// Errors that can occur while manipulating a [`Registry`].
///
/// These only surface at configuration time (registration and removal), which
/// is rare and typically covered by tests.  Instrumentation hot paths never
/// return errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The metric name does not satisfy the naming rules.
    #[error("invalid metric name `{name}`: {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Which rule it broke.
        reason: &'static str,
    },

    /// A declared label name does not satisfy the naming rules.
    #[error("metric `{name}` declares invalid label name `{label}`: {reason}")]
    InvalidLabelName {
        /// The metric being registered.
        name: String,
        /// The offending label name.
        label: String,
        /// Which rule it broke.
        reason: &'static str,
    },

    /// The name is already taken in this registry.
    #[error("a metric named `{name}` is already registered")]
    AlreadyRegistered {
        /// The contested name.
        name: String,
    },

    /// The metric was previously registered under a different name.
    #[error("metric is already named `{existing}` and cannot be registered as `{requested}`")]
    NameConflict {
        /// The name the metric already carries.
        existing: String,
        /// The name this registration attempted to assign.
        requested: String,
    },

    /// No metric with the given name exists in this registry.
    #[error("no metric named `{name}` is registered")]
    NotFound {
        /// The requested name.
        name: String,
    },
}

/// Checks a metric or label name against the naming rules: ASCII, 1 to 200
/// characters, first character `[A-Za-z_:]`, remainder `[A-Za-z0-9_:]`.
pub(crate) fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name is longer than 200 characters");
    }
    if !name.is_ascii() {
        return Err("name contains non-ASCII characters");
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if valid_name_start_character(c) => {}
        _ => return Err("name must start with a letter, underscore, or colon"),
    }
    if !chars.all(valid_name_character) {
        return Err("name may only contain letters, digits, underscores, and colons");
    }

    Ok(())
}

#[inline]
fn valid_name_start_character(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

#[inline]
fn valid_name_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// A named collection of metrics.
///
/// Names are unique within a registry and held in lexicographic order, so
/// that walking the registry yields deterministic output.  A process-wide
/// default registry is available through
/// [`default_registry`](crate::default_registry); custom registries are
/// freely constructible.
#[derive(Default)]
pub struct Registry {
    metrics: Mutex<BTreeMap<String, Metric>>,
}

impl Registry {
    /// Creates an empty `Registry`.
    pub fn new() -> Registry {
        Registry { metrics: Mutex::new(BTreeMap::new()) }
    }

    /// Registers a metric under `name`.
    ///
    /// The name, and every label name the metric declares, must satisfy the
    /// naming rules.  Fails if the name is already taken, or if the metric was
    /// previously registered under a different name.  On success the metric
    /// carries `name` for the rest of its life, and registering it under the
    /// same name in another registry is allowed.
    pub fn register<M: Into<Metric>>(&self, name: &str, metric: M) -> Result<(), RegistryError> {
        self.register_inner(name, metric.into(), false)
    }

    /// Registers a metric under `name`, replacing any existing entry.
    ///
    /// Replacement is logged as a warning, since it usually indicates two
    /// subsystems fighting over a name.
    pub fn register_or_replace<M: Into<Metric>>(
        &self,
        name: &str,
        metric: M,
    ) -> Result<(), RegistryError> {
        self.register_inner(name, metric.into(), true)
    }

    fn register_inner(
        &self,
        name: &str,
        metric: Metric,
        overwrite: bool,
    ) -> Result<(), RegistryError> {
        validate_name(name)
            .map_err(|reason| RegistryError::InvalidName { name: name.to_owned(), reason })?;

        if let Some(schema) = metric.schema() {
            for label in schema.names() {
                validate_name(label).map_err(|reason| RegistryError::InvalidLabelName {
                    name: name.to_owned(),
                    label: label.to_owned(),
                    reason,
                })?;
            }
        }

        let mut metrics = self.metrics.lock();
        if !overwrite && metrics.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered { name: name.to_owned() });
        }

        metric.set_name(name).map_err(|existing| RegistryError::NameConflict {
            existing: existing.into_owned(),
            requested: name.to_owned(),
        })?;

        if metrics.insert(name.to_owned(), metric).is_some() {
            warn!(name, "replaced an already registered metric");
        }

        Ok(())
    }

    /// Registers every metric declared by a [`MetricSet`].
    ///
    /// Stops at the first failure; members registered before the failure stay
    /// registered.
    pub fn register_set<S: MetricSet + ?Sized>(&self, set: &S) -> Result<(), RegistryError> {
        for (name, metric) in set.metrics() {
            self.register(name.as_ref(), metric)?;
        }
        Ok(())
    }

    /// Removes the metric registered under `name`.
    ///
    /// The metric object itself survives and keeps its name; only this
    /// registry's reference is dropped.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        match self.metrics.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(RegistryError::NotFound { name: name.to_owned() }),
        }
    }

    /// Removes every entry.  The registry itself remains usable.
    pub fn clear(&self) {
        self.metrics.lock().clear();
    }

    /// Looks up the metric registered under `name`.
    pub fn get(&self, name: &str) -> Result<Metric, RegistryError> {
        self.metrics
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { name: name.to_owned() })
    }

    /// A point-in-time snapshot of `(name, metric)` pairs in ascending name
    /// order.
    pub fn metrics(&self) -> Vec<(String, Metric)> {
        self.metrics.lock().iter().map(|(name, metric)| (name.clone(), metric.clone())).collect()
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }

    /// Reads the current value of a cell, without creating anything.
    ///
    /// Returns `None` on any kind of miss: unknown metric, schema-invalid
    /// labels, or a cell that has not been created yet.  Misses are silent;
    /// this is a read-only convenience for tests and introspection.
    pub fn value_of<L: IntoLabels>(&self, name: &str, labels: L) -> Option<f64> {
        let metric = self.metrics.lock().get(name).cloned()?;
        metric.existing_cell(&labels.into_labels()).map(|cell| cell.value())
    }

    /// Resets every scalar metric's cell to zero.
    ///
    /// Grouped cells are left alone; they come and go with eviction, and test
    /// scaffolding only needs scalar resets.
    pub fn zero_all(&self) {
        let metrics = self.metrics.lock();
        for metric in metrics.values() {
            if let Some(cell) = metric.scalar_cell() {
                cell.set(0.0);
            }
        }
    }
}

/// A structured declaration of a program's metrics.
///
/// Implementors enumerate `(name, metric)` pairs so a whole record of metrics
/// can be registered in one call, via [`Registry::register_set`] or
/// [`publish`].
pub trait MetricSet {
    /// The metrics this set declares, each under its registration name.
    fn metrics(&self) -> Vec<(SharedString, Metric)>;
}

/// Registers every metric declared by `set` with the default registry.
pub fn publish<S: MetricSet + ?Sized>(set: &S) -> Result<(), RegistryError> {
    default_registry().register_set(set)
}
