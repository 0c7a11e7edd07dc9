//! Slot identifiers for the comms layer
//!
//! TigerStyle: Explicit types, validation on parse, immutable after creation.
//!
//! A slot is a typed reference identifier valid within one namespace: either
//! the kernel-facing namespace of this vat, or the wire namespace of one
//! remote connection. A kernel-local slot and a remote wire slot with equal
//! text are different entities unless a CList explicitly maps them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// SlotKind
// =============================================================================

/// What a slot refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// An exported/imported object
    Object,
    /// A promise for a not-yet-delivered result
    Promise,
    /// A kernel device node (never allowed to cross a connection)
    Device,
}

impl SlotKind {
    /// Single-character prefix used in the text form
    pub fn prefix(self) -> char {
        match self {
            SlotKind::Object => 'o',
            SlotKind::Promise => 'p',
            SlotKind::Device => 'd',
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c {
            'o' => Some(SlotKind::Object),
            'p' => Some(SlotKind::Promise),
            'd' => Some(SlotKind::Device),
            _ => None,
        }
    }
}

// =============================================================================
// VatSlot
// =============================================================================

/// A typed, namespace-scoped reference identifier
///
/// Text form is `<kind><sign><id>`, e.g. `o+5`, `p-3`, `d+1`. The sign
/// records which side of the namespace boundary minted the id: `+` means
/// allocated by self, `-` means allocated by the other side.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct VatSlot {
    kind: SlotKind,
    allocated_by_self: bool,
    id: u64,
}

impl VatSlot {
    /// Create a slot of the given kind
    pub const fn new(kind: SlotKind, allocated_by_self: bool, id: u64) -> Self {
        Self {
            kind,
            allocated_by_self,
            id,
        }
    }

    /// Create an object slot
    pub const fn object(allocated_by_self: bool, id: u64) -> Self {
        Self::new(SlotKind::Object, allocated_by_self, id)
    }

    /// Create a promise slot
    pub const fn promise(allocated_by_self: bool, id: u64) -> Self {
        Self::new(SlotKind::Promise, allocated_by_self, id)
    }

    /// Create a device slot
    pub const fn device(allocated_by_self: bool, id: u64) -> Self {
        Self::new(SlotKind::Device, allocated_by_self, id)
    }

    /// Get the slot kind
    pub const fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Whether the owning side of this namespace minted the id
    pub const fn allocated_by_self(&self) -> bool {
        self.allocated_by_self
    }

    /// Get the numeric id
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Check if this is an object slot
    pub const fn is_object(&self) -> bool {
        matches!(self.kind, SlotKind::Object)
    }

    /// Check if this is a promise slot
    pub const fn is_promise(&self) -> bool {
        matches!(self.kind, SlotKind::Promise)
    }

    /// Check if this is a device slot
    pub const fn is_device(&self) -> bool {
        matches!(self.kind, SlotKind::Device)
    }

    /// Swap the allocating side, translating "your X" into "my X"
    ///
    /// Slots on the wire are written in the sender's perspective; the
    /// receiver applies this before consulting its CList.
    pub const fn change_perspective(&self) -> Self {
        Self {
            kind: self.kind,
            allocated_by_self: !self.allocated_by_self,
            id: self.id,
        }
    }
}

impl fmt::Display for VatSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.allocated_by_self { '+' } else { '-' };
        write!(f, "{}{}{}", self.kind.prefix(), sign, self.id)
    }
}

impl FromStr for VatSlot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let kind = chars
            .next()
            .and_then(SlotKind::from_prefix)
            .ok_or_else(|| Error::invalid_slot(s, "unknown kind prefix"))?;
        let allocated_by_self = match chars.next() {
            Some('+') => true,
            Some('-') => false,
            _ => return Err(Error::invalid_slot(s, "missing +/- allocation sign")),
        };
        let id: u64 = chars
            .as_str()
            .parse()
            .map_err(|_| Error::invalid_slot(s, "id is not a decimal integer"))?;
        Ok(Self::new(kind, allocated_by_self, id))
    }
}

impl From<VatSlot> for String {
    fn from(slot: VatSlot) -> Self {
        slot.to_string()
    }
}

impl TryFrom<String> for VatSlot {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

// =============================================================================
// RemoteId
// =============================================================================

/// Identifier for one registered remote connection
///
/// Assigned sequentially by the controller when a remote is registered.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RemoteId(u32);

impl RemoteId {
    /// Create a new remote id
    pub const fn new(id: u32) -> Self {
        RemoteId(id)
    }

    /// Get the raw id
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display() {
        assert_eq!(VatSlot::object(true, 5).to_string(), "o+5");
        assert_eq!(VatSlot::promise(false, 3).to_string(), "p-3");
        assert_eq!(VatSlot::device(true, 1).to_string(), "d+1");
    }

    #[test]
    fn test_slot_parse_roundtrip() {
        for text in ["o+5", "o-0", "p+12", "p-3", "d+1"] {
            let slot: VatSlot = text.parse().unwrap();
            assert_eq!(slot.to_string(), text);
        }
    }

    #[test]
    fn test_slot_parse_rejects_garbage() {
        for text in ["", "x+1", "o1", "o+", "o+abc", "o*3", "p+-1"] {
            let parsed: Result<VatSlot> = text.parse();
            assert!(parsed.is_err(), "expected parse failure for {:?}", text);
        }
    }

    #[test]
    fn test_change_perspective_flips_allocator() {
        let mine = VatSlot::object(true, 7);
        let yours = mine.change_perspective();
        assert!(!yours.allocated_by_self());
        assert_eq!(yours.kind(), SlotKind::Object);
        assert_eq!(yours.id(), 7);
        assert_eq!(yours.change_perspective(), mine);
    }

    #[test]
    fn test_slot_serde_as_string() {
        let slot = VatSlot::promise(false, 9);
        let json = serde_json::to_string(&slot).unwrap();
        assert_eq!(json, "\"p-9\"");
        let back: VatSlot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slot);
    }

    #[test]
    fn test_remote_id_display() {
        assert_eq!(RemoteId::new(3).to_string(), "remote-3");
        assert_eq!(RemoteId::new(3).value(), 3);
    }
}
