//! Comms vat state
//!
//! TigerStyle: One owner for all mutable state, no globals, no interior
//! mutability.
//!
//! Everything the protocol engine knows lives in this struct: the remote
//! table, per-remote CLists, promise bookkeeping, and the deterministic id
//! allocators. It is created once, owned by the dispatch layer, and threaded
//! explicitly through every delivery.

use crate::remote::{validate_remote_name, Remote};
use selkie_core::{
    constants::REMOTES_COUNT_MAX, CommsConfig, Error, RemoteId, Result, SlotKind, VatSlot,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The kernel-facing object controller deliveries arrive at
pub const CONTROLLER_SLOT: VatSlot = VatSlot::object(true, 0);

/// Which side settles a pending promise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decider {
    /// Settlement arrives from the kernel via notify
    Kernel,
    /// Settlement arrives from this remote via a wire event
    Remote(RemoteId),
}

/// Bookkeeping for one unresolved promise known to the comms layer
#[derive(Debug)]
pub struct PendingResolution {
    pub decider: Decider,
    /// Remotes to forward the settlement to
    pub interested: BTreeSet<RemoteId>,
}

/// All mutable state of the comms vat
#[derive(Debug)]
pub struct CommsState {
    config: CommsConfig,
    remotes: BTreeMap<RemoteId, Remote>,
    remote_names: HashMap<String, RemoteId>,
    /// Receiver object slot to owning remote
    receivers: HashMap<VatSlot, RemoteId>,
    /// Administrative objects that must never appear in message args
    meta_objects: BTreeSet<VatSlot>,
    /// Unresolved promises, by kernel-facing slot
    pending: HashMap<VatSlot, PendingResolution>,
    /// Promises that have already settled; pipelining to these is over
    retired: BTreeSet<VatSlot>,
    /// Which remote an imported object belongs to
    object_owners: HashMap<VatSlot, RemoteId>,
    next_remote_id: u32,
    next_object_id: u64,
    next_promise_id: u64,
}

impl CommsState {
    /// Create the initial state for a comms vat
    pub fn new(config: CommsConfig) -> Result<Self> {
        config.validate()?;
        let identifier_base = config.identifier_base;
        let mut meta_objects = BTreeSet::new();
        meta_objects.insert(CONTROLLER_SLOT);
        Ok(Self {
            config,
            remotes: BTreeMap::new(),
            remote_names: HashMap::new(),
            receivers: HashMap::new(),
            meta_objects,
            pending: HashMap::new(),
            retired: BTreeSet::new(),
            object_owners: HashMap::new(),
            next_remote_id: 1,
            next_object_id: identifier_base + 1,
            next_promise_id: identifier_base + 1,
        })
    }

    pub fn config(&self) -> &CommsConfig {
        &self.config
    }

    // =========================================================================
    // Local id allocation
    // =========================================================================

    /// Mint a fresh kernel-facing object slot
    pub fn allocate_object(&mut self) -> VatSlot {
        let id = self.next_object_id;
        self.next_object_id += 1;
        VatSlot::object(true, id)
    }

    /// Mint a fresh kernel-facing promise slot
    pub fn allocate_promise(&mut self) -> VatSlot {
        let id = self.next_promise_id;
        self.next_promise_id += 1;
        VatSlot::promise(true, id)
    }

    // =========================================================================
    // Remote registry
    // =========================================================================

    /// Register a new remote, returning its id and freshly minted receiver
    pub fn add_remote(
        &mut self,
        name: &str,
        transmitter: VatSlot,
    ) -> Result<(RemoteId, VatSlot)> {
        validate_remote_name(name)?;
        if self.remote_names.contains_key(name) {
            return Err(Error::RemoteAlreadyExists {
                name: name.to_string(),
            });
        }
        if self.remotes.len() >= REMOTES_COUNT_MAX {
            return Err(Error::limit_exceeded(
                "remotes",
                self.remotes.len() + 1,
                REMOTES_COUNT_MAX,
            ));
        }

        let id = RemoteId::new(self.next_remote_id);
        self.next_remote_id += 1;
        let receiver = self.allocate_object();
        let remote = Remote::new(id, name, transmitter, receiver, self.config.identifier_base);
        self.remotes.insert(id, remote);
        self.remote_names.insert(name.to_string(), id);
        self.receivers.insert(receiver, id);
        // Receivers are administrative: they route deliveries, they are not
        // capabilities to be passed around.
        self.meta_objects.insert(receiver);
        Ok((id, receiver))
    }

    /// Unregister a remote by name
    pub fn remove_remote(&mut self, name: &str) -> Result<()> {
        let id = self
            .remote_names
            .remove(name)
            .ok_or_else(|| Error::RemoteNotFound {
                name: name.to_string(),
            })?;
        let remote = self.remotes.remove(&id).ok_or_else(|| Error::RemoteNotFound {
            name: name.to_string(),
        })?;
        self.receivers.remove(&remote.receiver());
        self.meta_objects.remove(&remote.receiver());
        self.object_owners.retain(|_, owner| *owner != id);
        self.pending.retain(|_, p| p.decider != Decider::Remote(id));
        for p in self.pending.values_mut() {
            p.interested.remove(&id);
        }
        Ok(())
    }

    pub fn remote(&self, id: RemoteId) -> Option<&Remote> {
        self.remotes.get(&id)
    }

    pub fn remote_mut(&mut self, id: RemoteId) -> Option<&mut Remote> {
        self.remotes.get_mut(&id)
    }

    pub fn remote_id_by_name(&self, name: &str) -> Option<RemoteId> {
        self.remote_names.get(name).copied()
    }

    /// Which remote a receiver slot belongs to, if any
    pub fn remote_for_receiver(&self, receiver: VatSlot) -> Option<RemoteId> {
        self.receivers.get(&receiver).copied()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn remotes(&self) -> impl Iterator<Item = &Remote> {
        self.remotes.values()
    }

    // =========================================================================
    // Meta objects
    // =========================================================================

    pub fn add_meta_object(&mut self, slot: VatSlot) -> Result<()> {
        if !slot.is_object() {
            return Err(Error::invalid_slot(
                slot.to_string(),
                "only object slots can be meta objects",
            ));
        }
        self.meta_objects.insert(slot);
        Ok(())
    }

    pub fn remove_meta_object(&mut self, slot: VatSlot) -> Result<()> {
        if !self.meta_objects.remove(&slot) {
            return Err(Error::invalid_slot(
                slot.to_string(),
                "not a registered meta object",
            ));
        }
        Ok(())
    }

    pub fn is_meta_object(&self, slot: VatSlot) -> bool {
        self.meta_objects.contains(&slot)
    }

    // =========================================================================
    // Object ownership
    // =========================================================================

    pub fn record_object_owner(&mut self, slot: VatSlot, owner: RemoteId) {
        self.object_owners.insert(slot, owner);
    }

    /// Which remote owns an imported object slot
    pub fn object_owner(&self, slot: VatSlot) -> Option<RemoteId> {
        self.object_owners.get(&slot).copied()
    }

    // =========================================================================
    // Promise bookkeeping
    // =========================================================================

    /// Register a promise the comms layer now tracks
    pub fn register_pending(&mut self, promise: VatSlot, decider: Decider) {
        self.pending.entry(promise).or_insert_with(|| PendingResolution {
            decider,
            interested: BTreeSet::new(),
        });
    }

    pub fn pending(&self, promise: VatSlot) -> Option<&PendingResolution> {
        self.pending.get(&promise)
    }

    pub fn pending_mut(&mut self, promise: VatSlot) -> Option<&mut PendingResolution> {
        self.pending.get_mut(&promise)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Settle a promise: drop the pending entry and remember it settled
    ///
    /// Returns the entry so the caller can fan the settlement out to the
    /// interested remotes.
    pub fn retire(&mut self, promise: VatSlot) -> Result<PendingResolution> {
        match self.pending.remove(&promise) {
            Some(entry) => {
                self.retired.insert(promise);
                Ok(entry)
            }
            None if self.retired.contains(&promise) => Err(Error::PromiseAlreadyResolved {
                promise: promise.to_string(),
            }),
            None => Err(Error::UnknownPromise {
                promise: promise.to_string(),
            }),
        }
    }

    pub fn is_retired(&self, promise: VatSlot) -> bool {
        self.retired.contains(&promise)
    }

    // =========================================================================
    // Slot translation
    // =========================================================================

    /// Translate a kernel-facing slot into this remote's wire namespace
    ///
    /// Allocates a wire id and a CList entry on first crossing. Device slots
    /// and meta objects never cross a connection.
    pub fn map_outgoing(&mut self, remote_id: RemoteId, local: VatSlot) -> Result<VatSlot> {
        if local.is_device() {
            return Err(Error::DeviceSlotInMessage {
                slot: local.to_string(),
            });
        }
        if self.is_meta_object(local) {
            return Err(Error::MetaObjectInArgs {
                slot: local.to_string(),
            });
        }
        let remote = self.remotes.get_mut(&remote_id).ok_or_else(|| {
            Error::RemoteNotFound {
                name: remote_id.to_string(),
            }
        })?;
        if let Some(wire) = remote.clist.wire_for_local(local) {
            return Ok(wire);
        }
        let wire = remote.allocate_wire_slot(local.kind())?;
        remote.clist.add(local, wire)?;
        Ok(wire)
    }

    /// Translate a wire slot (already flipped into our perspective) into the
    /// kernel-facing namespace
    ///
    /// A peer-allocated slot seen for the first time gets a fresh local slot
    /// and a CList entry. A slot claiming to be one we minted must already be
    /// in the CList; anything else is a peer bug.
    pub fn map_incoming(&mut self, remote_id: RemoteId, wire: VatSlot) -> Result<VatSlot> {
        if wire.is_device() {
            return Err(Error::DeviceSlotInMessage {
                slot: wire.to_string(),
            });
        }
        let remote = self.remotes.get_mut(&remote_id).ok_or_else(|| {
            Error::RemoteNotFound {
                name: remote_id.to_string(),
            }
        })?;
        if let Some(local) = remote.clist.local_for_wire(wire) {
            return Ok(local);
        }
        if wire.allocated_by_self() {
            // The peer referenced an id it claims we minted, but we never did.
            return Err(Error::UnknownWireSlot {
                remote: remote.name().to_string(),
                slot: wire.to_string(),
            });
        }
        let local = match wire.kind() {
            SlotKind::Object => self.allocate_object(),
            SlotKind::Promise => self.allocate_promise(),
            SlotKind::Device => unreachable!("device slots rejected above"),
        };
        let remote = self.remotes.get_mut(&remote_id).expect("remote checked above");
        remote.clist.add(local, wire)?;
        if local.is_object() {
            self.object_owners.insert(local, remote_id);
        } else {
            // A promise first seen in the peer's args is settled by the peer.
            self.register_pending(local, Decider::Remote(remote_id));
        }
        Ok(local)
    }
}
