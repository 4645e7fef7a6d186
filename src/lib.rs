//! probe-relay: execution-probe collection and delivery
//!
//! Embeddable agent that accumulates per-method execution markers ("probes")
//! produced inside an instrumented process and ships them to a remote
//! collector on a fixed interval, without blocking the instrumented code
//! paths and with bounded memory under transport outages.
//!
//! ## Architecture
//!
//! - **[`probes`]**: the probe record data model — fixed-length bit vectors
//!   keyed by (class, session, test), merged by bitwise OR
//! - **[`buffer`]**: concurrent collection buffer producers write into and
//!   the sender atomically drains
//! - **[`wire`]**: batching (≤ 65,535 records), protobuf serialization, zstd
//!   compression, optional base64 text encoding
//! - **[`retention`]**: byte-bounded FIFO absorbing transport outages,
//!   oldest-first eviction
//! - **[`sender`]**: interval-driven background task running the delivery
//!   cycle
//! - **[`transport`]**: the two-method seam (`is_available` / `send`) plus
//!   the HTTP implementation
//! - **[`manager`]**: wiring facade for the embedding host

pub mod buffer;
pub mod config;
pub mod logging;
pub mod manager;
pub mod probes;
pub mod retention;
pub mod sender;
pub mod transport;
pub mod wire;

// Re-export the embedding surface
pub use buffer::ProbeBuffer;
pub use config::AgentConfig;
pub use logging::init_logging;
pub use manager::ProbeManager;
pub use probes::{ClassId, ProbeRecord, ProbeVector, DEFAULT_TEST_NAME, GLOBAL_SESSION_ID};
pub use retention::RetentionQueue;
pub use sender::IntervalSender;
pub use transport::{HttpTransport, ProbeTransport, TransportError};
