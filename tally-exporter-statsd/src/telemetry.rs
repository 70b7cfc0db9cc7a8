use tally::{Counter, Registry};
use tracing::warn;

/// The exporter's own counters.
///
/// `Telemetry` tracks how the exporter itself is behaving: how many datagrams
/// it has pushed, how far behind schedule its cycles run, and how much wall
/// time the cycles consume.  The counters are registered with the default
/// registry when the exporter starts, so they ride along with every other
/// metric the process exposes.
pub(crate) struct Telemetry {
    packets_sent: Counter,
    emission_lag_ms: Counter,
    emission_duration_ms: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance with unregistered counters.
    pub fn new() -> Telemetry {
        Telemetry {
            packets_sent: Counter::scalar(),
            emission_lag_ms: Counter::scalar(),
            emission_duration_ms: Counter::scalar(),
        }
    }

    /// Registers the counters with `registry`.
    ///
    /// Uses replace semantics so that restarting (or re-creating) an exporter
    /// keeps the names pointing at the live instance.  Failures are logged
    /// and swallowed; self-observation must never stop the exporter.
    pub fn register(&self, registry: &Registry) {
        let entries = [
            ("exporter_packets_sent_total", &self.packets_sent),
            ("exporter_emission_lag_ms_total", &self.emission_lag_ms),
            ("exporter_emission_duration_ms_total", &self.emission_duration_ms),
        ];
        for (name, counter) in entries {
            if let Err(error) = registry.register_or_replace(name, counter) {
                warn!(name, %error, "failed to register exporter self-metric");
            }
        }
    }

    /// Tracks the number of payloads handed to the backend this cycle.
    pub fn track_packets_sent(&self, count: usize) {
        self.packets_sent.increment(count as f64);
    }

    /// Tracks positive deviation from the emission schedule, in whole
    /// milliseconds.
    pub fn track_emission_lag_ms(&self, lag_ms: f64) {
        self.emission_lag_ms.increment(lag_ms);
    }

    /// Tracks wall time spent inside one emit cycle, in whole milliseconds.
    pub fn track_emission_duration_ms(&self, duration_ms: f64) {
        self.emission_duration_ms.increment(duration_ms);
    }

    #[cfg(test)]
    pub fn packets_sent_value(&self) -> f64 {
        self.packets_sent.cell_if_exists(()).map(|cell| cell.value()).unwrap_or(0.0)
    }

    #[cfg(test)]
    pub fn emission_lag_ms_value(&self) -> f64 {
        self.emission_lag_ms.cell_if_exists(()).map(|cell| cell.value()).unwrap_or(0.0)
    }

    #[cfg(test)]
    pub fn emission_duration_ms_value(&self) -> f64 {
        self.emission_duration_ms.cell_if_exists(()).map(|cell| cell.value()).unwrap_or(0.0)
    }
}
