//! Built-in configuration defaults

/// Delivery cycle period
pub const SEND_INTERVAL_MS: u64 = 2_000;

/// Retention queue cap in bytes (512 MiB)
pub const RETENTION_LIMIT_BYTES: usize = 512 * 1024 * 1024;

/// Collector base URL
pub const COLLECTOR_URL: &str = "http://localhost:8090";

/// Instance identifier reported to the collector
pub const INSTANCE_ID: &str = "default";
