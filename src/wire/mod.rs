//! Wire format and encoding pipeline
//!
//! Turns a drained record sequence into transport-ready payloads:
//! chunk into batches of at most [`MAX_BATCH_RECORDS`] records, encode each
//! batch as a protobuf [`proto::CoverMessage`], compress with zstd, and —
//! when the transport needs a text-safe channel — base64-encode the result.
//!
//! A batch that fails to serialize or compress is logged and dropped; the
//! remaining batches of the same drain proceed. Decoding helpers exist for
//! round-trip verification.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use prost::Message;
use tracing::error;

use crate::probes::{ProbeRecord, ProbeVector};

/// Maximum records per batch message. Caps serialized payload size so a
/// single message never exceeds transport limits regardless of producer
/// volume.
pub const MAX_BATCH_RECORDS: usize = 0xffff;

/// zstd compression level for batch payloads. Runs off the hot path, so the
/// ratio is favored over latency.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Protobuf message types for the batch wire schema.
///
/// Hand-written prost derives matching the collector's fixed schema. Using
/// derives directly avoids protoc and proto file management.
pub mod proto {
    /// A batch of probe records, the unit of one send.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CoverMessage {
        /// Up to 65,535 records.
        #[prost(message, repeated, tag = "1")]
        pub records: Vec<Record>,
    }

    /// One class's probes for one (session, test) context.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Record {
        #[prost(int64, tag = "1")]
        pub class_id: i64,
        #[prost(string, tag = "2")]
        pub class_name: String,
        /// Packed probe bits with a trailing length-marker bit.
        #[prost(bytes = "vec", tag = "3")]
        pub probes: Vec<u8>,
        #[prost(string, tag = "4")]
        pub session_id: String,
        #[prost(string, tag = "5")]
        pub test_id: String,
        #[prost(string, tag = "6")]
        pub test_name: String,
    }
}

/// Encoding pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decode error: {0}")]
    Decode(String),
}

fn to_wire_record(record: &ProbeRecord) -> proto::Record {
    proto::Record {
        class_id: record.class_id,
        class_name: record.class_name.clone(),
        probes: record.probes.to_wire_bytes(),
        session_id: record.session_id.clone(),
        test_id: record.test_id.clone(),
        test_name: record.test_name.clone(),
    }
}

fn from_wire_record(record: proto::Record) -> Result<ProbeRecord, WireError> {
    let probes = ProbeVector::from_wire_bytes(&record.probes)
        .ok_or_else(|| WireError::Decode("probe bytes missing length marker".to_string()))?;
    Ok(ProbeRecord {
        class_id: record.class_id,
        class_name: record.class_name,
        probes,
        session_id: record.session_id,
        test_id: record.test_id,
        test_name: record.test_name,
    })
}

/// Encode one batch: protobuf → zstd → optional base64.
pub fn encode_batch(records: &[ProbeRecord], text_encode: bool) -> Result<Vec<u8>, WireError> {
    let message = proto::CoverMessage {
        records: records.iter().map(to_wire_record).collect(),
    };

    let mut encoded = Vec::with_capacity(message.encoded_len());
    message
        .encode(&mut encoded)
        .map_err(|e| WireError::Serialization(e.to_string()))?;

    let compressed = zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL)
        .map_err(|e| WireError::Compression(e.to_string()))?;

    if text_encode {
        Ok(BASE64.encode(&compressed).into_bytes())
    } else {
        Ok(compressed)
    }
}

/// Run a drained record sequence through the full pipeline.
///
/// Order within the drain is preserved across the produced payloads. A batch
/// that fails to encode is dropped with an error log — encoding failures are
/// fatal only for that batch, never for the cycle.
pub fn encode_payloads(records: &[ProbeRecord], text_encode: bool) -> Vec<Vec<u8>> {
    let mut payloads = Vec::new();
    for batch in records.chunks(MAX_BATCH_RECORDS) {
        match encode_batch(batch, text_encode) {
            Ok(payload) => payloads.push(payload),
            Err(e) => {
                error!(batch_records = batch.len(), error = %e, "Dropping un-encodable batch");
            }
        }
    }
    payloads
}

/// Reverse the pipeline: optional base64 → zstd → protobuf.
pub fn decode_payload(payload: &[u8], text_encoded: bool) -> Result<Vec<ProbeRecord>, WireError> {
    let compressed = if text_encoded {
        BASE64
            .decode(payload)
            .map_err(|e| WireError::Decode(e.to_string()))?
    } else {
        payload.to_vec()
    };

    let encoded =
        zstd::decode_all(compressed.as_slice()).map_err(|e| WireError::Compression(e.to_string()))?;

    let message = proto::CoverMessage::decode(encoded.as_slice())
        .map_err(|e| WireError::Decode(e.to_string()))?;

    message.records.into_iter().map(from_wire_record).collect()
}
