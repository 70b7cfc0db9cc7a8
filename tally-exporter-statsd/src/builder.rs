use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tally::{default_registry, Registry};
use thiserror::Error;

use crate::exporter::StatsdExporter;
use crate::forwarder::{Backend, UdpBackend};
use crate::worker::Emitter;

const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_SEND_OLDER_THAN: Duration = Duration::from_secs(120);

/// Errors that could occur while building a statsd exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// Failed to create the UDP socket for the default backend.
    #[error("failed to create UDP socket for exporter backend: {0}")]
    Socket(#[from] std::io::Error),
}

/// Builder for a [`StatsdExporter`].
pub struct StatsdExporterBuilder {
    send_interval: Duration,
    send_older_than: Duration,
    remote_addrs: Vec<SocketAddr>,
    backend: Option<Box<dyn Backend>>,
    registries: Vec<Arc<Registry>>,
}

impl StatsdExporterBuilder {
    /// Sets how often an emit cycle runs.
    ///
    /// A zero interval disables emission entirely: the exporter's `start`
    /// logs a warning and does nothing.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_send_interval(mut self, send_interval: Duration) -> Self {
        self.send_interval = send_interval;
        self
    }

    /// Sets the freshness window of the recency filter.
    ///
    /// A cell that has not changed since the previous cycle is skipped only
    /// while its last change is younger than this window; older cells are
    /// re-emitted every cycle.
    ///
    /// Defaults to 120 seconds.
    #[must_use]
    pub fn with_send_older_than(mut self, send_older_than: Duration) -> Self {
        self.send_older_than = send_older_than;
        self
    }

    /// Sets the remote address the default UDP backend sends to, in
    /// `<host>:<port>` form.
    ///
    /// Defaults to `127.0.0.1:8125`.
    ///
    /// # Errors
    ///
    /// If the given address cannot be parsed or resolved, an error is
    /// returned indicating the reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        match addr.as_ref().to_socket_addrs() {
            Ok(addrs) => {
                self.remote_addrs = addrs.collect();
                Ok(self)
            }
            Err(e) => Err(BuildError::InvalidRemoteAddress { reason: e.to_string() }),
        }
    }

    /// Replaces the backend payloads are sent through.
    ///
    /// The exporter's emission task is the backend's sole caller, so the
    /// backend does not need to tolerate concurrent use.
    #[must_use]
    pub fn with_backend<B: Backend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Adds a registry to the set the exporter scans.
    ///
    /// When no registry is added, the exporter scans the default registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registries.push(registry);
        self
    }

    /// Builds the exporter.
    ///
    /// # Errors
    ///
    /// Fails if no backend was supplied and the default UDP backend cannot
    /// be created or connected.
    pub fn build(self) -> Result<StatsdExporter, BuildError> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => Box::new(UdpBackend::connect(&self.remote_addrs[..])?),
        };

        let registries = if self.registries.is_empty() {
            vec![default_registry()]
        } else {
            self.registries
        };

        let emitter =
            Emitter::new(self.send_interval, self.send_older_than, registries, backend);
        Ok(StatsdExporter::new(self.send_interval, emitter))
    }
}

impl Default for StatsdExporterBuilder {
    fn default() -> Self {
        StatsdExporterBuilder {
            send_interval: DEFAULT_SEND_INTERVAL,
            send_older_than: DEFAULT_SEND_OLDER_THAN,
            remote_addrs: vec![SocketAddr::from(([127, 0, 0, 1], 8125))],
            backend: None,
            registries: Vec::new(),
        }
    }
}
