use tally::{labels, Counter, Gauge, LabelKind, MetricSet, SharedString};

struct AppMetrics {
    requests: Counter,
    in_flight: Gauge,
}

impl MetricSet for AppMetrics {
    fn metrics(&self) -> Vec<(SharedString, tally::Metric)> {
        vec![
            (SharedString::from("app_requests_total"), self.requests.as_metric()),
            (SharedString::from("app_requests_in_flight"), self.in_flight.as_metric()),
        ]
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let metrics = AppMetrics {
        requests: Counter::grouped([("action", LabelKind::String)]),
        in_flight: Gauge::scalar(),
    };
    tally::publish(&metrics).expect("metric names are valid and unique");

    metrics.in_flight.increment(1.0);
    metrics.requests.cell(labels! { "action" => "get" }).increment(1.0);
    metrics.in_flight.decrement(1.0);

    let registry = tally::default_registry();
    println!(
        "requests(action=get) = {:?}",
        registry.value_of("app_requests_total", labels! { "action" => "get" })
    );
    println!("in flight = {:?}", registry.value_of("app_requests_in_flight", ()));
}
