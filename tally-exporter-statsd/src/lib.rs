//! A statsd-compatible UDP push exporter for [`tally`] registries.
//!
//! Where the scrape renderer waits to be asked, this exporter reports on its
//! own schedule: a background task wakes every send interval, walks the
//! configured registries, and pushes one UDP datagram per changed cell to a
//! statsd server.
//!
//! # Usage
//!
//! ```no_run
//! use tally_exporter_statsd::StatsdExporter;
//!
//! let mut exporter = StatsdExporter::builder()
//!     .with_remote_address("127.0.0.1:8125")
//!     .expect("address parses")
//!     .build()
//!     .expect("socket is available");
//!
//! exporter.start();
//! // ... the program runs, mutating its metrics ...
//! exporter.stop();
//! ```
//!
//! # Wire format
//!
//! One metric line per datagram.  Counters are emitted as deltas since the
//! previous cycle (`name:delta|c`), gauges as absolute values
//! (`name:value|g`), each optionally followed by `|#key:value,...` tags in
//! canonical label order.  Tag values are not escaped; keep them clear of
//! `,`, `:`, `|`, and `#`.
//!
//! # What gets emitted
//!
//! A cell is skipped only when it has not changed since the previous cycle
//! *and* its last change is still inside the `send_older_than` window.  The
//! first cycle therefore emits every cell once (establishing counter
//! baselines), and long-idle cells are periodically re-emitted so downstream
//! aggregation does not forget them.
//!
//! # Self-observation
//!
//! Starting the exporter registers three counters with the default registry:
//! `exporter_packets_sent_total`, `exporter_emission_lag_ms_total`, and
//! `exporter_emission_duration_ms_total`.

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, StatsdExporterBuilder};

mod exporter;
pub use self::exporter::StatsdExporter;

mod forwarder;
pub use self::forwarder::{Backend, UdpBackend};

mod telemetry;
mod worker;
