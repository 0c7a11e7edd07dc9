//! Capability-bearing message payloads
//!
//! TigerStyle: Explicit encoding, no silent data loss.
//!
//! Arguments crossing the kernel boundary are an opaque JSON body plus an
//! out-of-band slot list; capability references inside the body are indexes
//! into the slot list. The comms layer translates the slot list and never
//! interprets the body, keeping the wire serialization format decoupled
//! from slot identity.

use crate::slot::VatSlot;
use serde::{Deserialize, Serialize};

/// A message payload: serialized body plus the slots it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapData {
    /// JSON-serialized body; capability references are indexes into `slots`
    pub body: String,
    /// Slots referenced by the body, in index order
    pub slots: Vec<VatSlot>,
}

impl CapData {
    /// Create a new payload
    pub fn new(body: impl Into<String>, slots: Vec<VatSlot>) -> Self {
        Self {
            body: body.into(),
            slots,
        }
    }

    /// Create an empty payload (`[]` body, no slots)
    pub fn empty() -> Self {
        Self {
            body: "[]".to_string(),
            slots: Vec::new(),
        }
    }

    /// Total payload size in bytes (body plus slot text forms)
    pub fn size_bytes(&self) -> usize {
        let slots_len: usize = self.slots.iter().map(|s| s.to_string().len()).sum();
        self.body.len() + slots_len
    }
}
