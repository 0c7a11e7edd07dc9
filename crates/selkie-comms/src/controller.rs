//! Controller operations
//!
//! TigerStyle: Parse, then act. Admin mistakes are reported, never fatal.
//!
//! The controller is the administrative face of the comms vat, reached at a
//! well-known kernel slot. Its operations arrive as ordinary deliveries:
//! positional parameters in the args body, capability parameters in the
//! args slots.

use crate::state::CommsState;
use selkie_core::{CapData, Error, Result, VatSlot};
use tracing::info;

/// A parsed controller request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerOp {
    /// Register a connection to a named remote machine
    AddRemote { name: String, transmitter: VatSlot },
    /// Tear down a registered connection
    RemoveRemote { name: String },
    /// Publish a local object to a remote at a pre-agreed egress index
    AddEgress {
        name: String,
        index: u64,
        export: VatSlot,
    },
    /// Import the remote object published at a pre-agreed ingress index
    ///
    /// The index lives in the same self-allocated wire id space the lazy
    /// exporter draws from; binding it reserves the id so later exports
    /// skip past it.
    AddIngress { name: String, index: u64 },
    /// Shield an administrative object from ever crossing a connection
    AddMetaObject { slot: VatSlot },
    /// Lift the shield again
    RemoveMetaObject { slot: VatSlot },
}

/// What a successful controller operation answers with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerReply {
    /// Fulfill the result promise to plain data
    Data(CapData),
    /// Fulfill the result promise to a capability
    Target(VatSlot),
}

impl ControllerOp {
    /// Parse a delivery addressed to the controller
    pub fn parse(method: &str, args: &CapData) -> Result<Self> {
        let params: Vec<serde_json::Value> = serde_json::from_str(&args.body)
            .map_err(|e| Error::invalid_controller_args(method, format!("args body: {e}")))?;
        match method {
            "addRemote" => {
                let name = string_param(method, &params, 0)?;
                let transmitter = slot_param(method, args, 0)?;
                if !transmitter.is_object() {
                    return Err(Error::invalid_controller_args(
                        method,
                        format!("transmitter {transmitter} is not an object"),
                    ));
                }
                Ok(Self::AddRemote { name, transmitter })
            }
            "removeRemote" => Ok(Self::RemoveRemote {
                name: string_param(method, &params, 0)?,
            }),
            "addEgress" => {
                let export = slot_param(method, args, 0)?;
                if !export.is_object() {
                    return Err(Error::invalid_controller_args(
                        method,
                        format!("egress {export} is not an object"),
                    ));
                }
                Ok(Self::AddEgress {
                    name: string_param(method, &params, 0)?,
                    index: u64_param(method, &params, 1)?,
                    export,
                })
            }
            "addIngress" => Ok(Self::AddIngress {
                name: string_param(method, &params, 0)?,
                index: u64_param(method, &params, 1)?,
            }),
            "addMetaObject" => Ok(Self::AddMetaObject {
                slot: slot_param(method, args, 0)?,
            }),
            "removeMetaObject" => Ok(Self::RemoveMetaObject {
                slot: slot_param(method, args, 0)?,
            }),
            _ => Err(Error::UnknownControllerOp {
                method: method.to_string(),
            }),
        }
    }

    /// Execute against the vat state
    pub fn apply(self, state: &mut CommsState) -> Result<ControllerReply> {
        match self {
            Self::AddRemote { name, transmitter } => {
                let (id, receiver) = state.add_remote(&name, transmitter)?;
                info!(remote = %id, name = %name, %receiver, "remote registered");
                Ok(ControllerReply::Target(receiver))
            }
            Self::RemoveRemote { name } => {
                state.remove_remote(&name)?;
                info!(name = %name, "remote removed");
                Ok(ControllerReply::Data(ack_data()))
            }
            Self::AddEgress {
                name,
                index,
                export,
            } => {
                let id = state
                    .remote_id_by_name(&name)
                    .ok_or_else(|| Error::RemoteNotFound { name: name.clone() })?;
                if state.is_meta_object(export) {
                    return Err(Error::invalid_controller_args(
                        "addEgress",
                        format!("meta-object {export} cannot be published"),
                    ));
                }
                // The peer addresses the egress by the agreed index, so the
                // wire id counts as peer-allocated on this side.
                let wire = VatSlot::object(false, index);
                let remote = state.remote_mut(id).expect("looked up above");
                match remote.clist.local_for_wire(wire) {
                    Some(existing) if existing == export => {}
                    Some(_) => {
                        return Err(Error::invalid_controller_args(
                            "addEgress",
                            format!("egress index {index} is already bound"),
                        ));
                    }
                    None => {
                        if remote.clist.wire_for_local(export).is_some() {
                            return Err(Error::invalid_controller_args(
                                "addEgress",
                                format!("{export} is already visible to {name}"),
                            ));
                        }
                        remote.clist.add(export, wire)?;
                    }
                }
                info!(remote = %id, index, %export, "egress published");
                Ok(ControllerReply::Data(ack_data()))
            }
            Self::AddIngress { name, index } => {
                let id = state
                    .remote_id_by_name(&name)
                    .ok_or_else(|| Error::RemoteNotFound { name: name.clone() })?;
                let wire = VatSlot::object(true, index);
                if let Some(local) = state
                    .remote(id)
                    .expect("looked up above")
                    .clist
                    .local_for_wire(wire)
                {
                    return Ok(ControllerReply::Target(local));
                }
                let local = state.allocate_object();
                let remote = state.remote_mut(id).expect("looked up above");
                remote.clist.add(local, wire)?;
                remote.reserve_wire_object_id(index);
                state.record_object_owner(local, id);
                info!(remote = %id, index, %local, "ingress bound");
                Ok(ControllerReply::Target(local))
            }
            Self::AddMetaObject { slot } => {
                state.add_meta_object(slot)?;
                Ok(ControllerReply::Data(ack_data()))
            }
            Self::RemoveMetaObject { slot } => {
                state.remove_meta_object(slot)?;
                Ok(ControllerReply::Data(ack_data()))
            }
        }
    }
}

fn ack_data() -> CapData {
    CapData::new("true", Vec::new())
}

fn string_param(method: &str, params: &[serde_json::Value], index: usize) -> Result<String> {
    params
        .get(index)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::invalid_controller_args(method, format!("missing string parameter {index}"))
        })
}

fn u64_param(method: &str, params: &[serde_json::Value], index: usize) -> Result<u64> {
    params
        .get(index)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| {
            Error::invalid_controller_args(method, format!("missing integer parameter {index}"))
        })
}

fn slot_param(method: &str, args: &CapData, index: usize) -> Result<VatSlot> {
    args.slots.get(index).copied().ok_or_else(|| {
        Error::invalid_controller_args(method, format!("missing capability parameter {index}"))
    })
}
