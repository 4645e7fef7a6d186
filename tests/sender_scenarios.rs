//! Sender Pipeline Integration Tests
//!
//! Drives the delivery cycle and the full background sender against fake
//! transports: outage absorption, retention ordering, bounded eviction,
//! failure retry, and stop-mid-cycle behavior.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use probe_relay::sender::run_cycle;
use probe_relay::transport::{ProbeTransport, TransportError};
use probe_relay::{
    AgentConfig, IntervalSender, ProbeBuffer, ProbeManager, ProbeRecord, ProbeVector,
    RetentionQueue,
};

// ============================================================================
// Fakes
// ============================================================================

/// Recording transport with switchable availability and failure injection.
#[derive(Default)]
struct FakeTransport {
    available: AtomicBool,
    fail_sends: AtomicBool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl FakeTransport {
    fn up() -> Self {
        let transport = Self::default();
        transport.available.store(true, Ordering::SeqCst);
        transport
    }

    fn down() -> Self {
        Self::default()
    }

    fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn set_failing(&self, failing: bool) {
        self.fail_sends.store(failing, Ordering::SeqCst);
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeTransport for FakeTransport {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Server(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
            ));
        }
        self.sent.lock().unwrap().push(payload.to_vec());
        Ok(())
    }
}

/// Transport whose sends block until released, to observe stop-mid-cycle.
struct GatedTransport {
    started_tx: tokio::sync::mpsc::UnboundedSender<()>,
    gate: tokio::sync::Semaphore,
    completed: AtomicUsize,
}

impl GatedTransport {
    fn new() -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<()>) {
        let (started_tx, started_rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            started_tx,
            gate: tokio::sync::Semaphore::new(0),
            completed: AtomicUsize::new(0),
        });
        (transport, started_rx)
    }
}

#[async_trait]
impl ProbeTransport for GatedTransport {
    async fn is_available(&self) -> bool {
        true
    }

    async fn send(&self, _payload: &[u8]) -> Result<(), TransportError> {
        let _ = self.started_tx.send(());
        let permit = self.gate.acquire().await.unwrap();
        drop(permit);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn record(class_id: i64, bits: &[bool]) -> ProbeRecord {
    ProbeRecord::global(class_id, format!("Class{class_id}"), ProbeVector::from_bools(bits))
}

fn class_ids(payload: &[u8]) -> Vec<i64> {
    probe_relay::wire::decode_payload(payload, false)
        .unwrap()
        .iter()
        .map(|r| r.class_id)
        .collect()
}

// ============================================================================
// Delivery cycle
// ============================================================================

/// Scenario A: same-key records collected before a flush arrive merged.
#[tokio::test]
async fn test_same_key_records_arrive_merged() {
    let buffer = ProbeBuffer::new();
    let queue = RetentionQueue::new(1024 * 1024);
    let transport = FakeTransport::up();
    let cancel = CancellationToken::new();

    buffer.collect(vec![record(1, &[true, false, true])]);
    buffer.collect(vec![record(1, &[false, true, false])]);

    run_cycle(&buffer, &queue, &transport, false, &cancel).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let records = probe_relay::wire::decode_payload(&sent[0], false).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].probes, ProbeVector::from_bools(&[true, true, true]));
}

/// Scenario B: payloads generated during an outage are all delivered, oldest
/// first, on the first tick with the transport back up.
#[tokio::test]
async fn test_outage_ticks_retain_then_deliver_in_order() {
    let buffer = ProbeBuffer::new();
    let queue = RetentionQueue::new(1024 * 1024);
    let transport = FakeTransport::down();
    let cancel = CancellationToken::new();

    for tick in 0..3i64 {
        buffer.collect((0..10).map(|i| record(tick * 100 + i, &[true])));
        run_cycle(&buffer, &queue, &transport, false, &cancel).await;
    }
    assert_eq!(transport.attempts(), 0);
    assert_eq!(queue.len(), 3);

    transport.set_available(true);
    run_cycle(&buffer, &queue, &transport, false, &cancel).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(queue.is_empty());

    // One payload per outage tick, in tick order.
    for (tick, payload) in sent.iter().enumerate() {
        let expected: Vec<i64> = (0..10).map(|i| tick as i64 * 100 + i).collect();
        assert_eq!(class_ids(payload), expected);
    }
}

/// Thirty retained payloads (ten per outage tick) drain oldest first.
#[tokio::test]
async fn test_thirty_retained_payloads_sent_oldest_first() {
    let buffer = ProbeBuffer::new();
    let queue = RetentionQueue::new(1024 * 1024);
    let transport = FakeTransport::up();
    let cancel = CancellationToken::new();

    for sequence in 0..30u8 {
        queue.add(vec![vec![sequence; 16]]);
    }

    run_cycle(&buffer, &queue, &transport, false, &cancel).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 30);
    for (sequence, payload) in sent.iter().enumerate() {
        assert_eq!(payload[0] as usize, sequence);
    }
}

/// Scenario C: a retention limit sized for two payloads keeps only the two
/// most recent after five outage cycles.
#[tokio::test]
async fn test_retention_cap_keeps_two_most_recent() {
    let probes = [true, false, true, false];
    let payload_bytes = probe_relay::wire::encode_batch(&[record(0, &probes)], false)
        .unwrap()
        .len();

    let buffer = ProbeBuffer::new();
    // Room for two payloads of this shape, with headroom below a third.
    let queue = RetentionQueue::new(payload_bytes * 2 + payload_bytes / 2);
    let transport = FakeTransport::down();
    let cancel = CancellationToken::new();

    for class_id in 0..5i64 {
        buffer.collect(vec![record(class_id, &probes)]);
        run_cycle(&buffer, &queue, &transport, false, &cancel).await;
    }

    let retained = queue.flush();
    assert_eq!(retained.len(), 2);
    assert_eq!(class_ids(&retained[0]), vec![3]);
    assert_eq!(class_ids(&retained[1]), vec![4]);
}

/// Send failures keep the cycle going and land the payload in retention.
#[tokio::test]
async fn test_failed_sends_retained_and_retried() {
    let buffer = ProbeBuffer::new();
    let queue = RetentionQueue::new(1024 * 1024);
    let transport = FakeTransport::up();
    transport.set_failing(true);
    let cancel = CancellationToken::new();

    buffer.collect(vec![record(1, &[true])]);
    run_cycle(&buffer, &queue, &transport, false, &cancel).await;

    assert_eq!(transport.attempts(), 1);
    assert!(transport.sent().is_empty());
    assert_eq!(queue.len(), 1);

    transport.set_failing(false);
    run_cycle(&buffer, &queue, &transport, false, &cancel).await;

    assert!(queue.is_empty());
    assert_eq!(class_ids(&transport.sent()[0]), vec![1]);
}

/// Retained payloads are not retried while the transport is down, and new
/// data is never lost behind them.
#[tokio::test]
async fn test_retained_wait_for_availability() {
    let buffer = ProbeBuffer::new();
    let queue = RetentionQueue::new(1024 * 1024);
    let transport = FakeTransport::down();
    let cancel = CancellationToken::new();

    queue.add(vec![vec![7u8; 16]]);
    run_cycle(&buffer, &queue, &transport, false, &cancel).await;

    assert_eq!(transport.attempts(), 0);
    assert_eq!(queue.len(), 1);
}

/// Text-encoded payloads reach the transport as base64 and decode back.
#[tokio::test]
async fn test_text_encoded_delivery_roundtrip() {
    let buffer = ProbeBuffer::new();
    let queue = RetentionQueue::new(1024 * 1024);
    let transport = FakeTransport::up();
    let cancel = CancellationToken::new();

    buffer.collect(vec![record(42, &[true, true, false])]);
    run_cycle(&buffer, &queue, &transport, true, &cancel).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].iter().all(u8::is_ascii));
    let records = probe_relay::wire::decode_payload(&sent[0], true).unwrap();
    assert_eq!(records[0].class_id, 42);
}

// ============================================================================
// Background sender lifecycle
// ============================================================================

/// Records collected while running are delivered without producer involvement.
#[tokio::test]
async fn test_sender_delivers_on_interval() {
    let buffer = Arc::new(ProbeBuffer::new());
    let queue = Arc::new(RetentionQueue::new(1024 * 1024));
    let transport = Arc::new(FakeTransport::up());

    let mut sender = IntervalSender::new(
        Duration::from_millis(20),
        false,
        Arc::clone(&buffer),
        Arc::clone(&queue),
        Arc::clone(&transport) as Arc<dyn ProbeTransport>,
    );

    sender.start();
    assert!(sender.is_running());

    buffer.collect(vec![record(5, &[true, false])]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    sender.stop();
    assert!(!sender.is_running());

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(class_ids(&sent[0]), vec![5]);
}

/// Double start is ignored; restart after stop works.
#[tokio::test]
async fn test_sender_start_stop_lifecycle() {
    let buffer = Arc::new(ProbeBuffer::new());
    let queue = Arc::new(RetentionQueue::new(1024 * 1024));
    let transport = Arc::new(FakeTransport::up());

    let mut sender = IntervalSender::new(
        Duration::from_millis(20),
        false,
        Arc::clone(&buffer),
        Arc::clone(&queue),
        Arc::clone(&transport) as Arc<dyn ProbeTransport>,
    );

    sender.start();
    sender.start(); // ignored
    assert!(sender.is_running());

    sender.stop();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let attempts_after_stop = transport.attempts();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(transport.attempts(), attempts_after_stop);

    sender.start();
    buffer.collect(vec![record(9, &[true])]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    sender.stop();

    assert_eq!(transport.sent().len(), 1);
}

/// Scenario D: stop lands mid-cycle — the in-flight send completes, no new
/// tick begins.
#[tokio::test]
async fn test_stop_mid_cycle_lets_send_finish() {
    let buffer = Arc::new(ProbeBuffer::new());
    let queue = Arc::new(RetentionQueue::new(1024 * 1024));
    let (transport, mut started_rx) = GatedTransport::new();

    let mut sender = IntervalSender::new(
        Duration::from_millis(20),
        false,
        Arc::clone(&buffer),
        Arc::clone(&queue),
        Arc::clone(&transport) as Arc<dyn ProbeTransport>,
    );

    buffer.collect(vec![record(1, &[true])]);
    sender.start();

    // Wait until the cycle is inside the send call, then stop. stop() must
    // return immediately even though the send is still blocked.
    started_rx.recv().await.unwrap();
    sender.stop();
    assert_eq!(transport.completed.load(Ordering::SeqCst), 0);

    // Release the in-flight send and give the task time to wind down.
    transport.gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.completed.load(Ordering::SeqCst), 1);
    // No further cycle ran after cancellation.
    assert!(started_rx.try_recv().is_err());
}

// ============================================================================
// Manager facade
// ============================================================================

#[tokio::test]
async fn test_manager_end_to_end_with_fake_transport() {
    let config = AgentConfig {
        send_interval_ms: 20,
        ..AgentConfig::default()
    };
    let transport = Arc::new(FakeTransport::up());
    let mut manager =
        ProbeManager::with_transport(&config, Arc::clone(&transport) as Arc<dyn ProbeTransport>);

    manager.start();
    manager.record(vec![
        ProbeRecord::for_test(1, "AccountService", ProbeVector::from_bools(&[true, false]), "s1", "shouldTransfer"),
        ProbeRecord::for_test(1, "AccountService", ProbeVector::from_bools(&[false, true]), "s1", "shouldTransfer"),
    ]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.stop();

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let records = probe_relay::wire::decode_payload(&sent[0], false).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].probes.count_set(), 2);
    assert_eq!(records[0].session_id, "s1");
    assert_eq!(records[0].test_name, "shouldTransfer");
}
