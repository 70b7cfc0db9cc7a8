use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tally::{epoch_seconds, LabelSet, LabelValue, Metric, MetricKind, Registry};
use tracing::error;

use crate::forwarder::Backend;
use crate::telemetry::Telemetry;

/// The emission pipeline driven by the exporter's periodic task.
///
/// The emitter owns everything a cycle touches: the backend, the last
/// emission timestamp, and the per-counter-cell map of last emitted values
/// that delta computation runs against.  Exactly one task drives an emitter,
/// so none of this state needs locking, and two exporters scanning the same
/// counter each keep their own baselines.
pub(crate) struct Emitter {
    send_interval: Duration,
    send_older_than: Duration,
    registries: Vec<Arc<Registry>>,
    backend: Box<dyn Backend>,
    /// Wall-clock time of the previous cycle; 0 means "never emitted".
    last_emission_ts: f64,
    /// Last value emitted per counter cell, keyed by metric identity and
    /// label set.
    last_emitted: HashMap<(usize, LabelSet), f64>,
    telemetry: Telemetry,
}

impl Emitter {
    pub fn new(
        send_interval: Duration,
        send_older_than: Duration,
        registries: Vec<Arc<Registry>>,
        backend: Box<dyn Backend>,
    ) -> Emitter {
        Emitter {
            send_interval,
            send_older_than,
            registries,
            backend,
            last_emission_ts: 0.0,
            last_emitted: HashMap::new(),
            telemetry: Telemetry::new(),
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Runs one emit cycle: walk the registries, format a message for every
    /// cell that passes the recency filter, and push the messages through the
    /// backend.
    pub fn emit_cycle(&mut self) {
        let cycle_started = Instant::now();
        let new_ts = epoch_seconds();

        let mut messages = Vec::new();
        let registries = self.registries.clone();
        for registry in &registries {
            for (name, metric) in registry.metrics() {
                self.collect_cells(&name, &metric, new_ts, &mut messages);
            }
        }

        if self.last_emission_ts != 0.0 {
            let lag_ms =
                ((new_ts - self.last_emission_ts) - self.send_interval.as_secs_f64()) * 1000.0;
            let lag_ms = lag_ms.floor();
            if lag_ms > 0.0 {
                self.telemetry.track_emission_lag_ms(lag_ms);
            }
        }

        for message in &messages {
            // Best effort; a failed send is dropped, not retried within the
            // cycle.
            if let Err(error) = self.backend.send(message) {
                error!(%error, "failed to send metrics payload");
            }
        }

        self.last_emission_ts = new_ts;
        self.telemetry.track_packets_sent(messages.len());
        self.telemetry.track_emission_duration_ms(cycle_started.elapsed().as_millis() as f64);
    }

    fn collect_cells(
        &mut self,
        name: &str,
        metric: &Metric,
        new_ts: f64,
        messages: &mut Vec<String>,
    ) {
        for cell in metric.cells() {
            if reported_recently(
                cell.last_changed(),
                new_ts,
                self.send_older_than,
                self.last_emission_ts,
            ) {
                continue;
            }

            let message = match metric.kind() {
                MetricKind::Counter => {
                    let current = cell.value();
                    let previous = self
                        .last_emitted
                        .insert((metric.id(), cell.labels().clone()), current)
                        .unwrap_or(0.0);
                    write_message(name, current - previous, 'c', cell.labels())
                }
                MetricKind::Gauge => write_message(name, cell.value(), 'g', cell.labels()),
            };
            messages.push(message);
        }
    }
}

/// The recency filter: `true` for cells that have not changed since the
/// previous cycle and are still inside the freshness window, which is exactly
/// the set a cycle skips.
///
/// Both comparisons are strict.  With the "never emitted" sentinel of 0 the
/// right-hand bound can never hold, so the first cycle emits everything --
/// including counters still at their zero baseline.
pub(crate) fn reported_recently(
    last_changed: f64,
    new_ts: f64,
    send_older_than: Duration,
    last_emission_ts: f64,
) -> bool {
    new_ts - send_older_than.as_secs_f64() < last_changed && last_changed < last_emission_ts
}

/// Formats one statsd line: `name:value|c` or `name:value|g`, with
/// `|#key:value,...` tags appended for labeled cells.
///
/// Tag values are written raw, statsd style; values must stay clear of `,`,
/// `:`, `|`, and `#`.
fn write_message(name: &str, value: f64, kind: char, labels: &LabelSet) -> String {
    let mut message = String::with_capacity(name.len() + 16);
    message.push_str(name);
    message.push(':');

    let mut float_writer = ryu::Buffer::new();
    message.push_str(float_writer.format(value));
    message.push('|');
    message.push(kind);

    let mut wrote_tag = false;
    for label in labels.iter() {
        if wrote_tag {
            message.push(',');
        } else {
            message.push_str("|#");
            wrote_tag = true;
        }

        message.push_str(label.key());
        message.push(':');
        match label.value() {
            LabelValue::Str(value) => message.push_str(value),
            LabelValue::Int(value) => {
                let mut int_writer = itoa::Buffer::new();
                message.push_str(int_writer.format(*value));
            }
            LabelValue::Bool(value) => message.push_str(if *value { "true" } else { "false" }),
            LabelValue::Float(value) => {
                message.push_str(float_writer.format(value.into_inner()));
            }
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::{reported_recently, write_message, Emitter};
    use crate::forwarder::Backend;

    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tally::{labels, Counter, Gauge, LabelKind, Registry};

    const INTERVAL: Duration = Duration::from_secs(60);
    const OLDER_THAN: Duration = Duration::from_secs(120);

    #[derive(Clone, Default)]
    struct CaptureBackend {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl CaptureBackend {
        fn drain(&self) -> Vec<String> {
            std::mem::take(&mut self.messages.lock().unwrap())
        }
    }

    impl Backend for CaptureBackend {
        fn send(&mut self, payload: &str) -> io::Result<()> {
            self.messages.lock().unwrap().push(payload.to_owned());
            Ok(())
        }
    }

    fn capture_emitter(registry: &Arc<Registry>) -> (Emitter, CaptureBackend) {
        let backend = CaptureBackend::default();
        let emitter = Emitter::new(
            INTERVAL,
            OLDER_THAN,
            vec![Arc::clone(registry)],
            Box::new(backend.clone()),
        );
        (emitter, backend)
    }

    // Timestamps live in f64 epoch seconds; keep successive events clearly
    // apart so ordering comparisons in the recency filter are unambiguous.
    fn settle() {
        std::thread::sleep(Duration::from_millis(2));
    }

    #[test]
    fn test_recency_filter_boundaries() {
        let older_than = Duration::from_secs(120);
        let now = 1_000_000.0;

        // Changed after the previous emission: emitted.
        assert!(!reported_recently(now - 1.0, now, older_than, now - 60.0));
        // Unchanged since the previous emission but still fresh: skipped.
        assert!(reported_recently(now - 90.0, now, older_than, now - 60.0));
        // Exactly at the previous emission: strict comparison, emitted.
        assert!(!reported_recently(now - 60.0, now, older_than, now - 60.0));
        // Exactly at the staleness bound: strict comparison, emitted.
        assert!(!reported_recently(now - 120.0, now, older_than, now - 60.0));
        // Older than the window: always emitted.
        assert!(!reported_recently(now - 500.0, now, older_than, now - 60.0));
        // Never emitted before: everything goes out.
        assert!(!reported_recently(now - 90.0, now, older_than, 0.0));
    }

    #[test]
    fn test_counter_deltas_across_cycles() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::scalar();
        registry.register("counter", &counter).unwrap();

        let (mut emitter, backend) = capture_emitter(&registry);

        // First cycle: the zero baseline still goes out.
        emitter.emit_cycle();
        assert_eq!(backend.drain(), vec!["counter:0.0|c"]);

        counter.increment(1.0);
        settle();
        emitter.emit_cycle();
        assert_eq!(backend.drain(), vec!["counter:1.0|c"]);

        // No change since the last cycle: the recency filter holds it back.
        settle();
        emitter.emit_cycle();
        assert_eq!(backend.drain(), Vec::<String>::new());

        counter.increment(2.0);
        settle();
        emitter.emit_cycle();
        assert_eq!(backend.drain(), vec!["counter:2.0|c"]);
    }

    #[test]
    fn test_gauge_absolute_values_across_cycles() {
        let registry = Arc::new(Registry::new());
        let gauge = Gauge::scalar_with(1.0);
        registry.register("gg", &gauge).unwrap();

        let (mut emitter, backend) = capture_emitter(&registry);

        emitter.emit_cycle();
        assert_eq!(backend.drain(), vec!["gg:1.0|g"]);

        settle();
        emitter.emit_cycle();
        assert_eq!(backend.drain(), Vec::<String>::new());

        gauge.increment(2.0);
        settle();
        emitter.emit_cycle();
        assert_eq!(backend.drain(), vec!["gg:3.0|g"]);

        gauge.decrement(0.5);
        settle();
        emitter.emit_cycle();
        assert_eq!(backend.drain(), vec!["gg:2.5|g"]);
    }

    #[test]
    fn test_emitted_deltas_sum_to_the_counter_value() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::scalar();
        registry.register("hits", &counter).unwrap();

        let (mut emitter, backend) = capture_emitter(&registry);

        let mut emitted_total = 0.0;
        for increment in [0.0, 3.0, 0.0, 1.5, 20.0] {
            counter.increment(increment);
            settle();
            emitter.emit_cycle();
            for message in backend.drain() {
                let value: f64 = message
                    .strip_prefix("hits:")
                    .and_then(|rest| rest.strip_suffix("|c"))
                    .unwrap()
                    .parse()
                    .unwrap();
                emitted_total += value;
            }
        }

        assert_eq!(emitted_total, 24.5);
        assert_eq!(registry.value_of("hits", ()), Some(24.5));
    }

    #[test]
    fn test_labeled_cells_carry_tags_in_canonical_order() {
        let registry = Arc::new(Registry::new());
        let requests = Counter::grouped([
            ("action", LabelKind::String),
            ("response_code", LabelKind::Int),
        ]);
        registry.register("requests", &requests).unwrap();
        requests.cell(labels! { "response_code" => 404, "action" => "get" }).increment(1.0);

        let (mut emitter, backend) = capture_emitter(&registry);
        emitter.emit_cycle();
        assert_eq!(backend.drain(), vec!["requests:1.0|c|#action:get,response_code:404"]);
    }

    #[test]
    fn test_write_message_tag_value_types() {
        let labels = labels! {
            "active" => true,
            "ratio" => 0.5,
            "shard" => 12,
            "zone" => "us-east",
        };
        assert_eq!(
            write_message("m", 2.0, 'g', &labels),
            "m:2.0|g|#active:true,ratio:0.5,shard:12,zone:us-east"
        );
        assert_eq!(write_message("m", 0.0, 'c', &labels! {}), "m:0.0|c");
    }

    #[test]
    fn test_exporters_keep_independent_baselines() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::scalar();
        registry.register("shared", &counter).unwrap();

        let (mut first, first_backend) = capture_emitter(&registry);
        let (mut second, second_backend) = capture_emitter(&registry);

        counter.increment(5.0);
        settle();
        first.emit_cycle();
        assert_eq!(first_backend.drain(), vec!["shared:5.0|c"]);

        counter.increment(1.0);
        settle();
        // The second emitter never emitted, so its baseline is still zero.
        second.emit_cycle();
        assert_eq!(second_backend.drain(), vec!["shared:6.0|c"]);

        settle();
        first.emit_cycle();
        assert_eq!(first_backend.drain(), vec!["shared:1.0|c"]);
    }

    #[test]
    fn test_telemetry_tracks_packets_and_duration() {
        let registry = Arc::new(Registry::new());
        let counter = Counter::scalar();
        registry.register("c", &counter).unwrap();

        let (mut emitter, backend) = capture_emitter(&registry);
        emitter.emit_cycle();
        assert_eq!(emitter.telemetry().packets_sent_value(), 1.0);

        settle();
        emitter.emit_cycle();
        assert_eq!(emitter.telemetry().packets_sent_value(), 1.0);

        counter.increment(1.0);
        settle();
        emitter.emit_cycle();
        assert_eq!(emitter.telemetry().packets_sent_value(), 2.0);
        assert!(emitter.telemetry().emission_duration_ms_value() >= 0.0);
        let _ = backend.drain();
    }

    #[test]
    fn test_lag_accumulates_when_cycles_run_behind_schedule() {
        let registry = Arc::new(Registry::new());
        let (mut emitter, _backend) = capture_emitter(&registry);
        // A zero-length schedule makes any gap between cycles count as lag.
        emitter.send_interval = Duration::ZERO;

        emitter.emit_cycle();
        assert_eq!(emitter.telemetry().emission_lag_ms_value(), 0.0);

        std::thread::sleep(Duration::from_millis(20));
        emitter.emit_cycle();
        assert!(emitter.telemetry().emission_lag_ms_value() >= 10.0);
    }

    #[test]
    fn test_send_failures_do_not_stop_the_cycle() {
        struct FailingBackend;
        impl Backend for FailingBackend {
            fn send(&mut self, _payload: &str) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::Other, "socket buffer full"))
            }
        }

        let registry = Arc::new(Registry::new());
        let counter = Counter::scalar();
        registry.register("c", &counter).unwrap();

        let mut emitter = Emitter::new(
            INTERVAL,
            OLDER_THAN,
            vec![Arc::clone(&registry)],
            Box::new(FailingBackend),
        );

        emitter.emit_cycle();
        // Attempted sends still count; the next cycle proceeds normally.
        assert_eq!(emitter.telemetry().packets_sent_value(), 1.0);
        counter.increment(1.0);
        settle();
        emitter.emit_cycle();
        assert_eq!(emitter.telemetry().packets_sent_value(), 2.0);
    }
}
