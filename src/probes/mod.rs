//! Probe data model — per-class execution markers and their identity
//!
//! A [`ProbeRecord`] carries one class's accumulated execution probes for one
//! (session, test) context. Probe vectors are fixed-length at class-load time;
//! records with the same (class, session, test) key merge by bitwise OR, so
//! coverage only ever accumulates within a collection interval.

use serde::{Deserialize, Serialize};

/// Stable numeric identifier of an instrumented class
pub type ClassId = i64;
/// Logical grouping of related test executions
pub type SessionId = String;
/// Identifier of a specific test invocation
pub type TestId = String;
/// Human-readable test name
pub type TestName = String;

/// Session used when execution carries no test context
pub const GLOBAL_SESSION_ID: &str = "global";
/// Test name used when the producing context has no test identity
pub const DEFAULT_TEST_NAME: &str = "unspecified";

/// Derive a stable test id from a test name (hex md5 digest).
pub fn test_id_of(test_name: &str) -> TestId {
    format!("{:x}", md5::compute(test_name.as_bytes()))
}

// ============================================================================
// Probe Vector
// ============================================================================

/// Fixed-length packed bit vector, one bit per instrumentable code location.
///
/// The length is set at creation and never changes; [`merge`](Self::merge)
/// requires both sides to have the same length (same class id implies same
/// probe count).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeVector {
    len: usize,
    words: Vec<u64>,
}

impl ProbeVector {
    /// Create an all-zero vector of `len` probes.
    pub fn with_len(len: usize) -> Self {
        Self {
            len,
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Build a vector from explicit probe flags.
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut vector = Self::with_len(bits.len());
        for (index, &hit) in bits.iter().enumerate() {
            if hit {
                vector.set(index);
            }
        }
        vector
    }

    /// Number of probes in the vector.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector holds zero probes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark the probe at `index` as executed.
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len, "probe index out of range");
        self.words[index / 64] |= 1 << (index % 64);
    }

    /// Whether the probe at `index` was executed.
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "probe index out of range");
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    /// Bitwise-OR `other` into `self`. Lengths must match.
    pub fn merge(&mut self, other: &ProbeVector) {
        debug_assert_eq!(self.len, other.len, "probe vector length mismatch");
        for (word, other_word) in self.words.iter_mut().zip(&other.words) {
            *word |= other_word;
        }
    }

    /// Count of executed probes.
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Pack into wire bytes with a trailing marker bit.
    ///
    /// One extra bit is appended at index `len` and always set, so the exact
    /// probe count survives serialization even when the tail of the vector is
    /// all zeros. Bits are packed LSB-first within each byte.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; (self.len + 1).div_ceil(8)];
        for index in 0..self.len {
            if self.get(index) {
                bytes[index / 8] |= 1 << (index % 8);
            }
        }
        // Marker bit at position `len`
        bytes[self.len / 8] |= 1 << (self.len % 8);
        bytes
    }

    /// Unpack wire bytes produced by [`to_wire_bytes`](Self::to_wire_bytes).
    ///
    /// Returns `None` when no marker bit is present (empty or malformed input).
    pub fn from_wire_bytes(bytes: &[u8]) -> Option<Self> {
        let last = bytes.iter().rposition(|&b| b != 0)?;
        let marker = last * 8 + (7 - bytes[last].leading_zeros() as usize);
        let mut vector = Self::with_len(marker);
        for index in 0..marker {
            if bytes[index / 8] & (1 << (index % 8)) != 0 {
                vector.set(index);
            }
        }
        Some(vector)
    }
}

// ============================================================================
// Probe Record
// ============================================================================

/// Merge identity of a probe record within a collection interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeKey {
    pub class_id: ClassId,
    pub session_id: SessionId,
    pub test_id: TestId,
}

/// One class's accumulated execution probes for one logical test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// Stable numeric identifier of the instrumented class
    pub class_id: ClassId,
    /// Human-readable class identifier
    pub class_name: String,
    /// Executed-location flags, fixed length at class-load time
    pub probes: ProbeVector,
    /// Session the probes were recorded under
    pub session_id: SessionId,
    /// Id of the test invocation that produced the probes
    pub test_id: TestId,
    /// Name of the test invocation that produced the probes
    pub test_name: TestName,
}

impl ProbeRecord {
    /// Record in the global session with the default test identity.
    pub fn global(class_id: ClassId, class_name: impl Into<String>, probes: ProbeVector) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            probes,
            session_id: GLOBAL_SESSION_ID.to_string(),
            test_id: test_id_of(DEFAULT_TEST_NAME),
            test_name: DEFAULT_TEST_NAME.to_string(),
        }
    }

    /// Record attributed to a specific session and test. The test id is
    /// derived from the test name.
    pub fn for_test(
        class_id: ClassId,
        class_name: impl Into<String>,
        probes: ProbeVector,
        session_id: impl Into<SessionId>,
        test_name: impl Into<TestName>,
    ) -> Self {
        let test_name = test_name.into();
        Self {
            class_id,
            class_name: class_name.into(),
            probes,
            session_id: session_id.into(),
            test_id: test_id_of(&test_name),
            test_name,
        }
    }

    /// Merge identity of this record.
    pub fn key(&self) -> ProbeKey {
        ProbeKey {
            class_id: self.class_id,
            session_id: self.session_id.clone(),
            test_id: self.test_id.clone(),
        }
    }

    /// Accumulate another record's probes into this one (bitwise OR).
    pub fn merge_from(&mut self, other: &ProbeRecord) {
        self.probes.merge(&other.probes);
    }
}
