//! Pushes a handful of metrics to a local statsd server for a few seconds.
//!
//! Run a listener first to watch the datagrams arrive:
//!
//! ```text
//! nc -u -l 8125
//! ```

use std::time::Duration;

use tally::{labels, Counter, Gauge, LabelKind};
use tally_exporter_statsd::StatsdExporter;

fn main() {
    tracing_subscriber::fmt::init();

    let registry = tally::default_registry();

    let requests = Counter::grouped([("action", LabelKind::String)]);
    registry.register("requests", &requests).expect("fresh registry");
    let queue_depth = Gauge::scalar();
    registry.register("queue_depth", &queue_depth).expect("fresh registry");

    let mut exporter = StatsdExporter::builder()
        .with_send_interval(Duration::from_secs(1))
        .build()
        .expect("local UDP socket is available");
    exporter.start();

    for tick in 0..10u32 {
        requests.cell(labels! { "action" => "get" }).increment(1.0);
        queue_depth.set(f64::from(tick % 4));
        std::thread::sleep(Duration::from_millis(500));
    }

    exporter.stop();
}
