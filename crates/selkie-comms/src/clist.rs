//! Per-remote capability translation table
//!
//! TigerStyle: Append-only, bijective, conflicts are fatal.
//!
//! A CList records which kernel-facing slot corresponds to which wire slot
//! for one remote connection. Entries are created lazily the first time a
//! reference crosses the connection and are never mutated afterwards, so a
//! capability keeps one stable identity per connection for the lifetime of
//! the vat.

use selkie_core::{constants::CLIST_ENTRIES_COUNT_MAX, Error, Result, VatSlot};
use std::collections::HashMap;

/// Bidirectional local/wire slot map for one remote
#[derive(Debug, Default, Clone)]
pub struct CList {
    local_to_wire: HashMap<VatSlot, VatSlot>,
    wire_to_local: HashMap<VatSlot, VatSlot>,
}

impl CList {
    /// Create an empty CList
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `local` and `wire` name the same entity
    ///
    /// Adding the identical pair twice is a no-op. Adding either side with a
    /// different counterpart breaks the bijection and is refused.
    pub fn add(&mut self, local: VatSlot, wire: VatSlot) -> Result<()> {
        match (self.local_to_wire.get(&local), self.wire_to_local.get(&wire)) {
            (None, None) => {
                if self.local_to_wire.len() >= CLIST_ENTRIES_COUNT_MAX {
                    return Err(Error::limit_exceeded(
                        "clist entries",
                        self.local_to_wire.len() + 1,
                        CLIST_ENTRIES_COUNT_MAX,
                    ));
                }
                self.local_to_wire.insert(local, wire);
                self.wire_to_local.insert(wire, local);
                Ok(())
            }
            (Some(existing_wire), Some(existing_local))
                if *existing_wire == wire && *existing_local == local =>
            {
                Ok(())
            }
            _ => Err(Error::ClistConflict {
                slot: local.to_string(),
                reason: format!("cannot remap to {wire}"),
            }),
        }
    }

    /// Wire slot for a kernel-facing slot, if already mapped
    pub fn wire_for_local(&self, local: VatSlot) -> Option<VatSlot> {
        self.local_to_wire.get(&local).copied()
    }

    /// Kernel-facing slot for a wire slot, if already mapped
    pub fn local_for_wire(&self, wire: VatSlot) -> Option<VatSlot> {
        self.wire_to_local.get(&wire).copied()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.local_to_wire.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.local_to_wire.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup_both_directions() {
        let mut clist = CList::new();
        let local = VatSlot::object(true, 4);
        let wire = VatSlot::object(true, 1);
        clist.add(local, wire).unwrap();

        assert_eq!(clist.wire_for_local(local), Some(wire));
        assert_eq!(clist.local_for_wire(wire), Some(local));
        assert_eq!(clist.len(), 1);
    }

    #[test]
    fn test_identical_re_add_is_noop() {
        let mut clist = CList::new();
        let local = VatSlot::promise(true, 2);
        let wire = VatSlot::promise(true, 1);
        clist.add(local, wire).unwrap();
        clist.add(local, wire).unwrap();
        assert_eq!(clist.len(), 1);
    }

    #[test]
    fn test_remap_is_refused() {
        let mut clist = CList::new();
        let local = VatSlot::object(true, 4);
        clist.add(local, VatSlot::object(true, 1)).unwrap();

        let err = clist.add(local, VatSlot::object(true, 2)).unwrap_err();
        assert!(matches!(err, Error::ClistConflict { .. }));

        let err = clist
            .add(VatSlot::object(true, 9), VatSlot::object(true, 1))
            .unwrap_err();
        assert!(matches!(err, Error::ClistConflict { .. }));
    }

    #[test]
    fn test_unmapped_lookup_is_none() {
        let clist = CList::new();
        assert_eq!(clist.wire_for_local(VatSlot::object(true, 1)), None);
        assert_eq!(clist.local_for_wire(VatSlot::object(false, 1)), None);
    }
}
