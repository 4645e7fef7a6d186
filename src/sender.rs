//! Interval sender — the periodic drain/encode/deliver cycle
//!
//! One background task per sender instance wakes on a fixed period and runs
//! one delivery cycle: drain the collection buffer, encode, and — when the
//! transport is available — send new payloads first, then retry retained
//! ones, best-effort payload by payload. Whatever could not be sent goes
//! into the retention queue through its bounded `add`.
//!
//! The cycle body lives in [`run_cycle`] as a free function over the buffer,
//! queue, and transport, so tests drive it directly with fakes; the task loop
//! only supplies scheduling and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::ProbeBuffer;
use crate::retention::RetentionQueue;
use crate::transport::ProbeTransport;
use crate::wire;

/// Background sender with a `Stopped → Running → Stopped` lifecycle.
pub struct IntervalSender {
    interval: Duration,
    text_encode: bool,
    buffer: Arc<ProbeBuffer>,
    queue: Arc<RetentionQueue>,
    transport: Arc<dyn ProbeTransport>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl IntervalSender {
    pub fn new(
        interval: Duration,
        text_encode: bool,
        buffer: Arc<ProbeBuffer>,
        queue: Arc<RetentionQueue>,
        transport: Arc<dyn ProbeTransport>,
    ) -> Self {
        Self {
            interval,
            text_encode,
            buffer,
            queue,
            transport,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Spawn the background delivery task.
    ///
    /// Calling `start` while already running is ignored with a warning. The
    /// first cycle runs one full period after start.
    pub fn start(&mut self) {
        if self.task.is_some() {
            warn!("Probe sender already running — ignoring start");
            return;
        }

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let buffer = Arc::clone(&self.buffer);
        let queue = Arc::clone(&self.queue);
        let transport = Arc::clone(&self.transport);
        let period = self.interval;
        let text_encode = self.text_encode;

        self.task = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Probe sending task exiting");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_cycle(&buffer, &queue, transport.as_ref(), text_encode, &cancel).await;
                    }
                }
            }
        }));

        info!(interval_ms = self.interval.as_millis() as u64, "Probe sending task started");
    }

    /// Request the task to stop.
    ///
    /// Cancels the pending timer wait and does not block on an in-flight
    /// cycle: the cycle observes cancellation between steps and winds down on
    /// its own. An in-progress send completes or fails naturally.
    pub fn stop(&mut self) {
        if self.task.take().is_none() {
            warn!("Probe sender not running — ignoring stop");
            return;
        }
        self.cancel.cancel();
        info!("Probe sending task stopped");
    }

    /// Whether the background task has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for IntervalSender {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One delivery cycle over (buffer, queue, transport).
///
/// Retained payloads are only retried when the transport reports
/// availability; new data is never queued behind retained data. Sends are
/// sequential, and cancellation is checked between sends — never mid-call.
/// Payloads not yet pushed into the queue when cancellation lands are lost,
/// which is the documented stop-time loss window.
pub async fn run_cycle(
    buffer: &ProbeBuffer,
    queue: &RetentionQueue,
    transport: &dyn ProbeTransport,
    text_encode: bool,
    cancel: &CancellationToken,
) {
    let records = buffer.flush();
    let payloads = wire::encode_payloads(&records, text_encode);
    drop(records);

    if !transport.is_available().await {
        if !payloads.is_empty() {
            debug!(payloads = payloads.len(), "Transport unavailable — retaining new payloads");
        }
        queue.add(payloads);
        return;
    }

    let mut unsent = Vec::new();
    let mut sent = 0usize;

    send_each(transport, payloads, &mut unsent, &mut sent, cancel).await;

    // Retained payloads are retried only while the cycle is still live.
    if !cancel.is_cancelled() {
        let retained = queue.flush();
        send_each(transport, retained, &mut unsent, &mut sent, cancel).await;
    }

    if sent > 0 {
        debug!(sent, "Delivery cycle completed");
    }
    if !unsent.is_empty() {
        warn!(payloads = unsent.len(), "Delivery incomplete — retaining unsent payloads");
        queue.add(unsent);
    }
}

/// Send payloads one by one, best-effort. Failures and payloads skipped after
/// cancellation accumulate in `unsent`.
async fn send_each(
    transport: &dyn ProbeTransport,
    payloads: Vec<Vec<u8>>,
    unsent: &mut Vec<Vec<u8>>,
    sent: &mut usize,
    cancel: &CancellationToken,
) {
    for payload in payloads {
        if cancel.is_cancelled() {
            unsent.push(payload);
            continue;
        }
        match transport.send(&payload).await {
            Ok(()) => *sent += 1,
            Err(e) => {
                debug!(bytes = payload.len(), error = %e, "Payload send failed");
                unsent.push(payload);
            }
        }
    }
}
