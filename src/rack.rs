//! RackServer: the process-wide entry point that hands out streaming sessions.

use crate::{RackServerBuilder, Result};
use rackd_server::{HostRuntime, SessionConfig, StreamingWorker, Transport};
use std::sync::Arc;

/// Owns the shared host runtime (plugin registry, control thread, recents) and
/// creates one [`StreamingWorker`] per client connection.
///
/// # Example
///
/// ```ignore
/// use rackd::prelude::*;
///
/// let server = RackServer::builder().registry(registry).build()?;
///
/// // For every accepted connection
/// let worker = server.open_session(Box::new(transport), session_config)?;
/// worker.add_plugin("VST3-Compressor-5c1d")?;
/// worker.start()?;
/// ```
pub struct RackServer {
    runtime: Arc<HostRuntime>,
}

impl RackServer {
    pub fn builder() -> RackServerBuilder {
        RackServerBuilder::default()
    }

    pub(crate) fn from_runtime(runtime: Arc<HostRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<HostRuntime> {
        &self.runtime
    }

    /// Create a worker for a new connection and configure it. The worker is not
    /// started, so plugins can be loaded before audio flows.
    pub fn open_session(
        &self,
        transport: Box<dyn Transport>,
        config: SessionConfig,
    ) -> Result<StreamingWorker> {
        let worker = StreamingWorker::new(Arc::clone(&self.runtime));
        worker.init(transport, config)?;
        tracing::info!("opened session {}", worker.session_id());
        Ok(worker)
    }

    pub fn recents(&self, host: &str) -> Vec<String> {
        self.runtime.recents().list(host)
    }

    /// Plugin instances alive across all sessions.
    pub fn loaded_plugins(&self) -> usize {
        self.runtime.loaded_count()
    }

    /// Stop the control thread. Sessions should be shut down first.
    pub fn shutdown(&self) {
        self.runtime.shutdown();
    }
}
