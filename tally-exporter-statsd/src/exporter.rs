use std::thread;
use std::time::Duration;

use tally::{default_registry, PeriodicTask};
use tracing::{error, warn};

use crate::builder::StatsdExporterBuilder;
use crate::worker::Emitter;

/// A periodic push exporter.
///
/// Once started, a background [`PeriodicTask`] runs one emit cycle per send
/// interval, pushing counter deltas and gauge values to the configured
/// backend.  Construct one through [`StatsdExporter::builder`].
pub struct StatsdExporter {
    send_interval: Duration,
    emitter: Option<Emitter>,
    task: Option<PeriodicTask>,
}

impl StatsdExporter {
    /// A builder with the default configuration: emit every 60 seconds over
    /// UDP to `127.0.0.1:8125`, scanning the default registry.
    pub fn builder() -> StatsdExporterBuilder {
        StatsdExporterBuilder::default()
    }

    pub(crate) fn new(send_interval: Duration, emitter: Emitter) -> StatsdExporter {
        StatsdExporter { send_interval, emitter: Some(emitter), task: None }
    }

    /// Starts emitting.
    ///
    /// Registers the exporter's own counters with the default registry and
    /// spawns the emission task.  With a zero send interval this logs a
    /// warning and does nothing.
    pub fn start(&mut self) {
        if self.task.is_some() {
            warn!("exporter is already running");
            return;
        }
        if self.send_interval.is_zero() {
            warn!("send interval is zero; metrics emission is disabled");
            return;
        }
        let Some(mut emitter) = self.emitter.take() else {
            warn!("exporter was stopped and cannot be restarted");
            return;
        };

        emitter.telemetry().register(&default_registry());

        match PeriodicTask::spawn("statsd-exporter", self.send_interval, move || {
            emitter.emit_cycle();
        }) {
            Ok(task) => self.task = Some(task),
            Err(error) => error!(%error, "failed to spawn the exporter's emission task"),
        }
    }

    /// Stops emitting.
    ///
    /// Cancels the emission task and waits for any in-flight cycle to finish,
    /// returning the task's join result.  Stopping an exporter that is not
    /// running returns `None`.
    pub fn stop(&mut self) -> Option<thread::Result<()>> {
        self.task.take().map(PeriodicTask::stop)
    }
}

impl Drop for StatsdExporter {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
