//! Renders a small set of metrics the way a scrape endpoint would serve them.
//!
//! A real program would mount `handle_scrape()` on its HTTP server at
//! `/metrics`; here we just print the body.

use tally::{labels, Counter, Gauge, LabelKind};

fn main() {
    let registry = tally::default_registry();

    let requests = Counter::grouped([
        ("action", LabelKind::String),
        ("response_code", LabelKind::Int),
    ]);
    registry.register("requests", &requests).expect("fresh registry");

    let temperature = Gauge::grouped([("location", LabelKind::String)]);
    registry.register("temperature", &temperature).expect("fresh registry");

    requests.cell(labels! { "action" => "get", "response_code" => 200 }).increment(17.0);
    requests.cell(labels! { "action" => "get", "response_code" => 404 }).increment(2.0);
    temperature.cell(labels! { "location" => "server_room" }).set(21.5);

    print!("{}", tally_exporter_prometheus::handle_scrape());
}
