//! Delivery translation engine
//!
//! TigerStyle: One struct per crank, explicit state threading, fail fast on
//! protocol violations.
//!
//! A `DeliveryKit` borrows the vat state and the kernel syscall handle for
//! the duration of one delivery and performs the actual translation work:
//! kernel sends out to the wire, wire messages in to kernel syscalls, and
//! promise settlements in both directions.

use crate::state::{CommsState, Decider};
use crate::syscall::{Resolution, Syscall};
use crate::wire::{
    pack_transmit_args, unpack_receive_args, Envelope, WireCall, WireEvent, WireEventKind,
    WireMessage,
};
use selkie_core::{
    constants::{
        MESSAGE_SLOTS_COUNT_MAX, METHOD_NAME_LENGTH_BYTES_MAX, WIRE_MESSAGE_SIZE_BYTES_MAX,
    },
    CapData, Error, RemoteId, Result, VatSlot,
};
use tracing::debug;

fn parse_wire_slot(text: &str) -> Result<VatSlot> {
    text.parse()
        .map_err(|_| Error::malformed_wire(format!("bad slot reference {text:?}")))
}

/// Translation context for one delivery
pub struct DeliveryKit<'a, S: Syscall> {
    state: &'a mut CommsState,
    syscall: &'a mut S,
}

impl<'a, S: Syscall> DeliveryKit<'a, S> {
    pub fn new(state: &'a mut CommsState, syscall: &'a mut S) -> Self {
        Self { state, syscall }
    }

    // =========================================================================
    // Outbound: kernel deliveries headed for a remote
    // =========================================================================

    /// Forward a kernel message whose target lives on a remote machine
    pub fn send_to_remote(
        &mut self,
        target: VatSlot,
        method: &str,
        args: &CapData,
        result: Option<VatSlot>,
    ) -> Result<()> {
        let remote_id = self.route_outbound_target(target)?;
        let (args_value, wire_slots) = self.translate_outbound_payload(remote_id, args)?;
        let wire_target = self.state.map_outgoing(remote_id, target)?;
        let result_slot = match result {
            Some(promise) => Some(
                self.prepare_outbound_result(remote_id, promise)?
                    .to_string(),
            ),
            None => None,
        };
        let message = WireMessage::Call(WireCall {
            target: wire_target.to_string(),
            method_name: method.to_string(),
            args: args_value,
            slots: wire_slots,
            result_slot,
        });
        self.transmit(remote_id, &message)
    }

    /// Which remote a kernel-delivered target routes to
    fn route_outbound_target(&self, target: VatSlot) -> Result<RemoteId> {
        if target.is_object() {
            return self
                .state
                .object_owner(target)
                .ok_or_else(|| Error::UnknownTarget {
                    slot: target.to_string(),
                });
        }
        if target.is_promise() {
            if self.state.is_retired(target) {
                return Err(Error::PromiseAlreadyResolved {
                    promise: target.to_string(),
                });
            }
            return match self.state.pending(target) {
                Some(entry) => match entry.decider {
                    Decider::Remote(remote_id) => Ok(remote_id),
                    Decider::Kernel => Err(Error::WrongDecider {
                        promise: target.to_string(),
                        reason: "pipelined send to a promise this vat settles itself".into(),
                    }),
                },
                None => Err(Error::UnknownTarget {
                    slot: target.to_string(),
                }),
            };
        }
        Err(Error::DeviceSlotInMessage {
            slot: target.to_string(),
        })
    }

    /// Translate a kernel payload into wire form, tracking promise interest
    fn translate_outbound_payload(
        &mut self,
        remote_id: RemoteId,
        args: &CapData,
    ) -> Result<(serde_json::Value, Vec<String>)> {
        if args.slots.len() > MESSAGE_SLOTS_COUNT_MAX {
            return Err(Error::limit_exceeded(
                "message slots",
                args.slots.len(),
                MESSAGE_SLOTS_COUNT_MAX,
            ));
        }
        let value: serde_json::Value = serde_json::from_str(&args.body)
            .map_err(|e| Error::malformed_wire(format!("outbound args body is not JSON: {e}")))?;
        let mut wire_slots = Vec::with_capacity(args.slots.len());
        for slot in &args.slots {
            if slot.is_promise() {
                self.register_outbound_interest(remote_id, *slot)?;
            }
            wire_slots.push(self.state.map_outgoing(remote_id, *slot)?.to_string());
        }
        Ok((value, wire_slots))
    }

    /// A promise crossing to `remote_id` in args: the peer now wants its
    /// settlement, and on first export this vat subscribes kernel-side
    fn register_outbound_interest(&mut self, remote_id: RemoteId, promise: VatSlot) -> Result<()> {
        if self.state.is_retired(promise) {
            return Ok(());
        }
        let fresh = self.state.pending(promise).is_none();
        self.state.register_pending(promise, Decider::Kernel);
        let entry = self.state.pending_mut(promise).expect("registered above");
        if entry.decider != Decider::Remote(remote_id) {
            entry.interested.insert(remote_id);
        }
        if fresh {
            self.syscall.subscribe(promise)?;
        }
        Ok(())
    }

    /// Record the result promise of an outbound send, whose settlement will
    /// arrive from the target remote
    fn prepare_outbound_result(
        &mut self,
        remote_id: RemoteId,
        promise: VatSlot,
    ) -> Result<VatSlot> {
        match self.state.pending(promise) {
            Some(entry) if entry.decider == Decider::Remote(remote_id) => {}
            Some(_) => {
                return Err(Error::WrongDecider {
                    promise: promise.to_string(),
                    reason: "result promise already settles from elsewhere".into(),
                });
            }
            None if self.state.is_retired(promise) => {
                return Err(Error::PromiseAlreadyResolved {
                    promise: promise.to_string(),
                });
            }
            None => {
                self.state
                    .register_pending(promise, Decider::Remote(remote_id));
            }
        }
        self.state.map_outgoing(remote_id, promise)
    }

    /// Frame one message and hand it to the remote's transmitter
    ///
    /// The outbound counter advances once per message even when the explicit
    /// sequence number is suppressed, so both framings number identically.
    pub fn transmit(&mut self, remote_id: RemoteId, message: &WireMessage) -> Result<()> {
        let body = message.encode()?;
        let explicit = self.state.config().send_explicit_seq_nums;
        let remote = self
            .state
            .remote_mut(remote_id)
            .ok_or_else(|| Error::RemoteNotFound {
                name: remote_id.to_string(),
            })?;
        let seq = explicit.then(|| remote.next_send_seq_num());
        remote.advance_send_seq_num();
        let envelope = Envelope {
            seq,
            ack: remote.last_received_seq_num(),
            body,
        };
        let transmitter = remote.transmitter();
        debug!(
            remote = %remote_id,
            seq = ?envelope.seq,
            ack = envelope.ack,
            "transmitting message"
        );
        let args = pack_transmit_args(&envelope)?;
        self.syscall.send(transmitter, "transmit", args, None)
    }

    // =========================================================================
    // Kernel settlements headed for remotes
    // =========================================================================

    /// Apply settlements from a kernel notify, forwarding each to every
    /// remote that holds the promise
    pub fn resolve_from_kernel(&mut self, resolutions: &[Resolution]) -> Result<()> {
        for resolution in resolutions {
            self.resolve_one(resolution)?;
        }
        Ok(())
    }

    fn resolve_one(&mut self, resolution: &Resolution) -> Result<()> {
        let promise = resolution.promise();
        match self.state.pending(promise) {
            Some(entry) if entry.decider == Decider::Kernel => {}
            Some(_) => {
                return Err(Error::WrongDecider {
                    promise: promise.to_string(),
                    reason: "kernel settled a promise a remote decides".into(),
                });
            }
            // retire reports the precise failure for absent entries
            None => {}
        }
        let entry = self.state.retire(promise)?;
        debug!(%promise, remotes = entry.interested.len(), "forwarding settlement");
        for remote_id in entry.interested {
            let event = self.build_settlement_event(remote_id, promise, resolution)?;
            self.transmit(remote_id, &WireMessage::Event(event))?;
        }
        Ok(())
    }

    fn build_settlement_event(
        &mut self,
        remote_id: RemoteId,
        promise: VatSlot,
        resolution: &Resolution,
    ) -> Result<WireEvent> {
        let wire_promise = self.state.map_outgoing(remote_id, promise)?.to_string();
        Ok(match resolution {
            Resolution::FulfillToData { args, .. } => {
                let (value, slots) = self.translate_outbound_payload(remote_id, args)?;
                WireEvent {
                    event: WireEventKind::FulfillToData,
                    promise: wire_promise,
                    args: Some(value),
                    slots,
                    target: None,
                }
            }
            Resolution::FulfillToTarget { target, .. } => {
                let wire_target = self.state.map_outgoing(remote_id, *target)?;
                WireEvent {
                    event: WireEventKind::FulfillToTarget,
                    promise: wire_promise,
                    args: None,
                    slots: Vec::new(),
                    target: Some(wire_target.to_string()),
                }
            }
            Resolution::Reject { args, .. } => {
                let (value, slots) = self.translate_outbound_payload(remote_id, args)?;
                WireEvent {
                    event: WireEventKind::Reject,
                    promise: wire_promise,
                    args: Some(value),
                    slots,
                    target: None,
                }
            }
        })
    }

    // =========================================================================
    // Inbound: wire messages from a remote
    // =========================================================================

    /// Process one `receive` delivery from a remote's receiver object
    pub fn message_from_remote(&mut self, remote_id: RemoteId, args: &CapData) -> Result<()> {
        let text = unpack_receive_args(args)?;
        if text.len() > WIRE_MESSAGE_SIZE_BYTES_MAX {
            return Err(Error::malformed_wire(format!(
                "message of {} bytes exceeds limit of {} bytes",
                text.len(),
                WIRE_MESSAGE_SIZE_BYTES_MAX
            )));
        }
        let envelope = Envelope::parse(&text)?;
        let remote = self
            .state
            .remote_mut(remote_id)
            .ok_or_else(|| Error::RemoteNotFound {
                name: remote_id.to_string(),
            })?;
        remote.note_inbound(envelope.seq, envelope.ack);
        debug!(
            remote = %remote_id,
            seq = ?envelope.seq,
            ack = envelope.ack,
            "inbound message"
        );
        match WireMessage::decode(&envelope.body)? {
            WireMessage::Call(call) => self.inbound_call(remote_id, &call),
            WireMessage::Event(event) => self.inbound_event(remote_id, &event),
        }
    }

    fn inbound_call(&mut self, remote_id: RemoteId, call: &WireCall) -> Result<()> {
        if call.method_name.len() > METHOD_NAME_LENGTH_BYTES_MAX {
            return Err(Error::malformed_wire(format!(
                "method name of {} bytes exceeds limit",
                call.method_name.len()
            )));
        }
        if call.slots.len() > MESSAGE_SLOTS_COUNT_MAX {
            return Err(Error::malformed_wire(format!(
                "{} message slots exceeds limit",
                call.slots.len()
            )));
        }
        let target = self.lookup_inbound_target(remote_id, &call.target)?;
        let mut slots = Vec::with_capacity(call.slots.len());
        for text in &call.slots {
            let wire = parse_wire_slot(text)?.change_perspective();
            slots.push(self.state.map_incoming(remote_id, wire)?);
        }
        let result = match &call.result_slot {
            Some(text) => Some(self.prepare_inbound_result(remote_id, text)?),
            None => None,
        };
        let kernel_args = CapData::new(call.args.to_string(), slots);
        self.syscall
            .send(target, &call.method_name, kernel_args, result.map(|r| r.0))?;
        if let Some((promise, fresh)) = result {
            if fresh {
                self.syscall.subscribe(promise)?;
            }
        }
        Ok(())
    }

    /// Resolve an inbound call target against the CList
    ///
    /// Calls only ever target entities previously introduced across this
    /// connection; a miss is a peer bug, not a fresh import.
    fn lookup_inbound_target(&mut self, remote_id: RemoteId, text: &str) -> Result<VatSlot> {
        let wire = parse_wire_slot(text)?.change_perspective();
        let remote = self
            .state
            .remote(remote_id)
            .ok_or_else(|| Error::RemoteNotFound {
                name: remote_id.to_string(),
            })?;
        let local = remote
            .clist
            .local_for_wire(wire)
            .ok_or_else(|| Error::UnknownWireSlot {
                remote: remote.name().to_string(),
                slot: wire.to_string(),
            })?;
        if local.is_promise() && self.state.is_retired(local) {
            return Err(Error::PromiseAlreadyResolved {
                promise: local.to_string(),
            });
        }
        Ok(local)
    }

    /// Map an inbound result slot, minting the local promise on first use
    ///
    /// Returns the kernel-facing promise and whether it was freshly minted
    /// (a fresh promise needs one kernel subscription).
    fn prepare_inbound_result(
        &mut self,
        remote_id: RemoteId,
        text: &str,
    ) -> Result<(VatSlot, bool)> {
        let wire = parse_wire_slot(text)?.change_perspective();
        if !wire.is_promise() {
            return Err(Error::malformed_wire(format!(
                "result slot {wire} is not a promise"
            )));
        }
        let existing = self
            .state
            .remote(remote_id)
            .ok_or_else(|| Error::RemoteNotFound {
                name: remote_id.to_string(),
            })?
            .clist
            .local_for_wire(wire);
        match existing {
            Some(local) => {
                if self.state.is_retired(local) {
                    return Err(Error::PromiseAlreadyResolved {
                        promise: local.to_string(),
                    });
                }
                match self.state.pending(local) {
                    Some(entry) if entry.decider == Decider::Kernel => {}
                    Some(_) => {
                        return Err(Error::WrongDecider {
                            promise: local.to_string(),
                            reason: "peer asked for the result of a promise it settles".into(),
                        });
                    }
                    None => {
                        return Err(Error::UnknownPromise {
                            promise: local.to_string(),
                        });
                    }
                }
                let entry = self.state.pending_mut(local).expect("checked above");
                entry.interested.insert(remote_id);
                Ok((local, false))
            }
            None => {
                if wire.allocated_by_self() {
                    let name = self
                        .state
                        .remote(remote_id)
                        .map(|r| r.name().to_string())
                        .unwrap_or_default();
                    return Err(Error::UnknownWireSlot {
                        remote: name,
                        slot: wire.to_string(),
                    });
                }
                let local = self.state.allocate_promise();
                self.state
                    .remote_mut(remote_id)
                    .expect("checked above")
                    .clist
                    .add(local, wire)?;
                self.state.register_pending(local, Decider::Kernel);
                let entry = self.state.pending_mut(local).expect("registered above");
                entry.interested.insert(remote_id);
                Ok((local, true))
            }
        }
    }

    fn inbound_event(&mut self, remote_id: RemoteId, event: &WireEvent) -> Result<()> {
        let wire = parse_wire_slot(&event.promise)?.change_perspective();
        let remote = self
            .state
            .remote(remote_id)
            .ok_or_else(|| Error::RemoteNotFound {
                name: remote_id.to_string(),
            })?;
        let remote_name = remote.name().to_string();
        let local = remote
            .clist
            .local_for_wire(wire)
            .ok_or_else(|| Error::UnknownWireSlot {
                remote: remote_name,
                slot: wire.to_string(),
            })?;
        match self.state.pending(local) {
            Some(entry) if entry.decider == Decider::Remote(remote_id) => {}
            Some(_) => {
                return Err(Error::WrongDecider {
                    promise: local.to_string(),
                    reason: "settlement from a remote that is not the decider".into(),
                });
            }
            // retire reports the precise failure for absent entries
            None => {}
        }
        let entry = self.state.retire(local)?;
        let resolution = match event.event {
            WireEventKind::FulfillToData => Resolution::FulfillToData {
                promise: local,
                args: self.translate_inbound_payload(remote_id, event)?,
            },
            WireEventKind::FulfillToTarget => {
                let text = event.target.as_deref().ok_or_else(|| {
                    Error::malformed_wire("fulfill-to-target event without target")
                })?;
                let wire_target = parse_wire_slot(text)?.change_perspective();
                let target = self.state.map_incoming(remote_id, wire_target)?;
                Resolution::FulfillToTarget {
                    promise: local,
                    target,
                }
            }
            WireEventKind::Reject => Resolution::Reject {
                promise: local,
                args: self.translate_inbound_payload(remote_id, event)?,
            },
        };
        self.syscall.resolve(vec![resolution.clone()])?;
        // Other remotes holding the promise learn of the settlement too.
        for other in entry.interested {
            if other != remote_id {
                let forwarded = self.build_settlement_event(other, local, &resolution)?;
                self.transmit(other, &WireMessage::Event(forwarded))?;
            }
        }
        Ok(())
    }

    fn translate_inbound_payload(
        &mut self,
        remote_id: RemoteId,
        event: &WireEvent,
    ) -> Result<CapData> {
        let value = event
            .args
            .as_ref()
            .ok_or_else(|| Error::malformed_wire("settlement event without args"))?;
        if event.slots.len() > MESSAGE_SLOTS_COUNT_MAX {
            return Err(Error::malformed_wire(format!(
                "{} event slots exceeds limit",
                event.slots.len()
            )));
        }
        let mut slots = Vec::with_capacity(event.slots.len());
        for text in &event.slots {
            let wire = parse_wire_slot(text)?.change_perspective();
            slots.push(self.state.map_incoming(remote_id, wire)?);
        }
        Ok(CapData::new(value.to_string(), slots))
    }
}
