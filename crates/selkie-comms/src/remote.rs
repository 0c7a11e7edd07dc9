//! Per-remote connection state
//!
//! TigerStyle: All counters explicit, deterministic allocation, no clocks.
//!
//! Each registered remote carries its own CList, wire id allocators, and
//! sequence counters. Counters only ever move forward; outbound numbering
//! advances once per transmitted message whether or not the number is
//! written into the envelope.

use crate::clist::CList;
use selkie_core::{
    constants::REMOTE_NAME_LENGTH_BYTES_MAX, Error, RemoteId, Result, SlotKind, VatSlot,
};

/// State for one remote connection
#[derive(Debug)]
pub struct Remote {
    id: RemoteId,
    name: String,
    /// Kernel object messages to the peer are transmitted through
    transmitter: VatSlot,
    /// Self-allocated object the peer's inbound deliveries arrive at
    receiver: VatSlot,
    /// Slot translation table for this connection
    pub clist: CList,
    /// Sequence number the next outbound message will carry
    send_seq_num: u64,
    /// Highest inbound sequence number seen
    recv_seq_num: u64,
    /// Highest of our sequence numbers the peer has acknowledged
    peer_ack_seq_num: u64,
    next_wire_object_id: u64,
    next_wire_promise_id: u64,
}

impl Remote {
    /// Create the state for a freshly registered remote
    pub fn new(
        id: RemoteId,
        name: impl Into<String>,
        transmitter: VatSlot,
        receiver: VatSlot,
        identifier_base: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            transmitter,
            receiver,
            clist: CList::new(),
            send_seq_num: identifier_base,
            recv_seq_num: 0,
            peer_ack_seq_num: 0,
            next_wire_object_id: identifier_base + 1,
            next_wire_promise_id: identifier_base + 1,
        }
    }

    pub fn id(&self) -> RemoteId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transmitter(&self) -> VatSlot {
        self.transmitter
    }

    pub fn receiver(&self) -> VatSlot {
        self.receiver
    }

    /// Sequence number the next outbound message will carry
    ///
    /// Does not advance the counter; pair with [`advance_send_seq_num`]
    /// once the message is actually handed off.
    ///
    /// [`advance_send_seq_num`]: Self::advance_send_seq_num
    pub fn next_send_seq_num(&self) -> u64 {
        self.send_seq_num
    }

    /// Commit one outbound message, advancing the counter
    pub fn advance_send_seq_num(&mut self) {
        self.send_seq_num += 1;
    }

    /// Highest inbound sequence number seen
    pub fn last_received_seq_num(&self) -> u64 {
        self.recv_seq_num
    }

    /// Highest of our own sequence numbers the peer has acknowledged
    pub fn peer_ack_seq_num(&self) -> u64 {
        self.peer_ack_seq_num
    }

    /// Account for one inbound message's numbering
    ///
    /// A message without an explicit sequence number still occupies a
    /// position in the inbound ordering.
    pub fn note_inbound(&mut self, seq: Option<u64>, ack: u64) {
        match seq {
            Some(seq) => self.recv_seq_num = seq,
            None => self.recv_seq_num += 1,
        }
        if ack > self.peer_ack_seq_num {
            self.peer_ack_seq_num = ack;
        }
    }

    /// Keep the allocator from ever minting a wire object id at or below `id`
    ///
    /// Ingress bindings claim pre-agreed indexes in the same self-allocated
    /// id space the lazy allocator draws from; reserving the index keeps the
    /// two from colliding.
    pub fn reserve_wire_object_id(&mut self, id: u64) {
        if self.next_wire_object_id <= id {
            self.next_wire_object_id = id + 1;
        }
    }

    /// Mint a fresh wire id for exporting a local slot to this peer
    ///
    /// Wire slots we mint carry the self-allocated sign; the peer flips
    /// perspective on receipt.
    pub fn allocate_wire_slot(&mut self, kind: SlotKind) -> Result<VatSlot> {
        let id = match kind {
            SlotKind::Object => {
                let id = self.next_wire_object_id;
                self.next_wire_object_id += 1;
                id
            }
            SlotKind::Promise => {
                let id = self.next_wire_promise_id;
                self.next_wire_promise_id += 1;
                id
            }
            SlotKind::Device => {
                return Err(Error::DeviceSlotInMessage {
                    slot: format!("d?{}", self.next_wire_object_id),
                });
            }
        };
        Ok(VatSlot::new(kind, true, id))
    }
}

/// Validate a remote name for registration
pub fn validate_remote_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRemoteName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    if name.len() > REMOTE_NAME_LENGTH_BYTES_MAX {
        return Err(Error::InvalidRemoteName {
            name: name.to_string(),
            reason: format!(
                "name length {} exceeds {} bytes",
                name.len(),
                REMOTE_NAME_LENGTH_BYTES_MAX
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(identifier_base: u64) -> Remote {
        Remote::new(
            RemoteId::new(1),
            "machine-b",
            VatSlot::object(false, 10),
            VatSlot::object(true, 100),
            identifier_base,
        )
    }

    #[test]
    fn test_send_seq_starts_at_identifier_base() {
        let mut r = remote(0);
        assert_eq!(r.next_send_seq_num(), 0);
        r.advance_send_seq_num();
        assert_eq!(r.next_send_seq_num(), 1);

        let r = remote(700);
        assert_eq!(r.next_send_seq_num(), 700);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let r = remote(0);
        assert_eq!(r.next_send_seq_num(), 0);
        assert_eq!(r.next_send_seq_num(), 0);
    }

    #[test]
    fn test_inbound_without_seq_still_advances() {
        let mut r = remote(0);
        r.note_inbound(Some(5), 0);
        assert_eq!(r.last_received_seq_num(), 5);
        r.note_inbound(None, 0);
        assert_eq!(r.last_received_seq_num(), 6);
    }

    #[test]
    fn test_peer_ack_never_regresses() {
        let mut r = remote(0);
        r.note_inbound(Some(1), 4);
        r.note_inbound(Some(2), 2);
        assert_eq!(r.peer_ack_seq_num(), 4);
    }

    #[test]
    fn test_wire_ids_start_past_identifier_base() {
        let mut r = remote(700);
        assert_eq!(
            r.allocate_wire_slot(SlotKind::Object).unwrap(),
            VatSlot::object(true, 701)
        );
        assert_eq!(
            r.allocate_wire_slot(SlotKind::Promise).unwrap(),
            VatSlot::promise(true, 701)
        );
        assert_eq!(
            r.allocate_wire_slot(SlotKind::Object).unwrap(),
            VatSlot::object(true, 702)
        );
    }

    #[test]
    fn test_reserved_wire_object_id_is_skipped() {
        let mut r = remote(0);
        r.reserve_wire_object_id(7);
        assert_eq!(
            r.allocate_wire_slot(SlotKind::Object).unwrap(),
            VatSlot::object(true, 8)
        );
        // reservation below the allocator floor changes nothing
        r.reserve_wire_object_id(3);
        assert_eq!(
            r.allocate_wire_slot(SlotKind::Object).unwrap(),
            VatSlot::object(true, 9)
        );
        // promise ids live in their own space
        assert_eq!(
            r.allocate_wire_slot(SlotKind::Promise).unwrap(),
            VatSlot::promise(true, 1)
        );
    }

    #[test]
    fn test_device_wire_slot_refused() {
        let mut r = remote(0);
        assert!(r.allocate_wire_slot(SlotKind::Device).is_err());
    }

    #[test]
    fn test_name_validation() {
        validate_remote_name("machine-b").unwrap();
        assert!(validate_remote_name("").is_err());
        assert!(validate_remote_name(&"x".repeat(REMOTE_NAME_LENGTH_BYTES_MAX + 1)).is_err());
    }
}
