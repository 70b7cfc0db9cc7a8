//! Prometheus-style text rendering for [`tally`] registries.
//!
//! This crate turns a [`Registry`] into a scrape-compatible text document.
//! It deliberately stops at producing the body: mounting it on an HTTP
//! server (conventionally at `/metrics`) is the embedder's job, which keeps
//! this crate free of any server stack.
//!
//! ```
//! use tally::{labels, Counter, LabelKind, Registry};
//!
//! let registry = Registry::new();
//! let requests = Counter::grouped([("action", LabelKind::String)]);
//! registry.register("requests", &requests).unwrap();
//! requests.cell(labels! { "action" => "get" }).increment(1.0);
//!
//! let body = tally_exporter_prometheus::render(&registry);
//! assert_eq!(body, "# TYPE requests counter\nrequests{action=\"get\"} 1.0\n\n");
//! ```
//!
//! Output is deterministic: metrics appear in ascending name order, and a
//! metric's cells in ascending order of their formatted label clause, so two
//! renders with no intervening mutation are byte-identical.

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

use tally::{default_registry, Registry};

mod formatting;
use self::formatting::{format_label_clause, write_metric_line, write_type_line};

/// Renders every metric in `registry` as text.
///
/// Each metric contributes a `# TYPE` line, one sample line per cell, and a
/// trailing blank line.
pub fn render(registry: &Registry) -> String {
    let mut output = String::new();

    for (name, metric) in registry.metrics() {
        write_type_line(&mut output, &name, metric.kind());

        let mut samples: Vec<(String, f64)> = metric
            .cells()
            .iter()
            .map(|cell| (format_label_clause(cell.labels()), cell.value()))
            .collect();
        samples.sort_by(|a, b| a.0.cmp(&b.0));

        for (label_clause, value) in samples {
            write_metric_line(&mut output, &name, &label_clause, value);
        }

        output.push('\n');
    }

    output
}

/// Renders the default registry.
///
/// This is the function to hang off a scrape endpoint: it returns the
/// response body, and the embedder supplies the server and the content type.
pub fn handle_scrape() -> String {
    render(&default_registry())
}
