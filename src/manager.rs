//! Probe manager — wires the pipeline together for an embedding host
//!
//! Owns the collection buffer, retention queue, transport, and interval
//! sender for one monitored application. The host records probes through
//! [`record`](ProbeManager::record) and drives the sender lifecycle with
//! [`start`](ProbeManager::start) / [`stop`](ProbeManager::stop).

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::buffer::ProbeBuffer;
use crate::config::AgentConfig;
use crate::probes::ProbeRecord;
use crate::retention::RetentionQueue;
use crate::sender::IntervalSender;
use crate::transport::{HttpTransport, ProbeTransport, TransportError};

/// One probe pipeline instance: buffer + retention + sender.
///
/// Multiple independent managers can coexist in one process; nothing here is
/// global.
pub struct ProbeManager {
    buffer: Arc<ProbeBuffer>,
    sender: IntervalSender,
}

impl ProbeManager {
    /// Build a manager with the real HTTP transport from `config`.
    pub fn new(config: &AgentConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(
            &config.collector_url,
            &config.api_key,
            &config.instance_id,
            config.text_encode,
        )?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a manager around an injected transport (tests use fakes here).
    pub fn with_transport(config: &AgentConfig, transport: Arc<dyn ProbeTransport>) -> Self {
        let buffer = Arc::new(ProbeBuffer::new());
        let queue = Arc::new(RetentionQueue::new(config.retention_limit_bytes));
        let sender = IntervalSender::new(
            Duration::from_millis(config.send_interval_ms),
            config.text_encode,
            Arc::clone(&buffer),
            queue,
            transport,
        );
        Self { buffer, sender }
    }

    /// Hand produced probe records to the pipeline. Never blocks on the
    /// sender.
    pub fn record<I>(&self, records: I)
    where
        I: IntoIterator<Item = ProbeRecord>,
    {
        self.buffer.collect(records);
    }

    /// The underlying buffer, for producers that hold their own handle.
    pub fn buffer(&self) -> Arc<ProbeBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Start the background delivery task.
    pub fn start(&mut self) {
        info!("Probe pipeline starting");
        self.sender.start();
    }

    /// Stop the background delivery task without waiting for an in-flight
    /// cycle.
    pub fn stop(&mut self) {
        self.sender.stop();
        info!("Probe pipeline stopped");
    }

    /// Whether the delivery task is currently running.
    pub fn is_running(&self) -> bool {
        self.sender.is_running()
    }
}
