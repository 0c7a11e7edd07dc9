//! Kernel-facing dispatch surface
//!
//! TigerStyle: One entry point per kernel delivery type, explicit lifecycle,
//! halt on protocol violations.
//!
//! `CommsDispatch` owns the vat state and the syscall handle. Each kernel
//! crank arrives through `deliver`, `notify`, or `drop_exports` and is routed
//! to the controller, a remote's receiver, or the outbound path. Protocol
//! violations terminate the vat; caller mistakes reject the result promise
//! and leave the vat running.

use crate::controller::{ControllerOp, ControllerReply};
use crate::debug::DebugView;
use crate::delivery::DeliveryKit;
use crate::state::{CommsState, CONTROLLER_SLOT};
use crate::syscall::{Resolution, Syscall};
use selkie_core::{CapData, CommsConfig, Error, Result, VatSlot};
use tracing::{error, info, warn};

/// Whether the vat is still willing to process deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VatLifecycle {
    Active,
    Terminated,
}

/// The comms vat: state, syscall handle, lifecycle
pub struct CommsDispatch<S: Syscall> {
    state: CommsState,
    syscall: S,
    lifecycle: VatLifecycle,
}

impl<S: Syscall> CommsDispatch<S> {
    /// Create a comms vat with the given configuration
    pub fn new(config: CommsConfig, syscall: S) -> Result<Self> {
        Ok(Self {
            state: CommsState::new(config)?,
            syscall,
            lifecycle: VatLifecycle::Active,
        })
    }

    pub fn lifecycle(&self) -> VatLifecycle {
        self.lifecycle
    }

    pub fn is_terminated(&self) -> bool {
        self.lifecycle == VatLifecycle::Terminated
    }

    /// Read-only view for tooling and tests
    pub fn debug(&self) -> DebugView<'_> {
        DebugView::new(&self.state)
    }

    /// The syscall handle, for inspection in tests
    pub fn syscall(&self) -> &S {
        &self.syscall
    }

    pub fn syscall_mut(&mut self) -> &mut S {
        &mut self.syscall
    }

    /// Process one kernel message delivery
    pub fn deliver(
        &mut self,
        target: VatSlot,
        method: &str,
        args: &CapData,
        result: Option<VatSlot>,
    ) -> Result<()> {
        self.crank(result, |state, syscall| {
            Self::route(state, syscall, target, method, args, result)
        })
    }

    /// Process kernel settlement notifications for subscribed promises
    pub fn notify(&mut self, resolutions: &[Resolution]) -> Result<()> {
        self.crank(None, |state, syscall| {
            DeliveryKit::new(state, syscall).resolve_from_kernel(resolutions)
        })
    }

    /// Process a kernel notice that exports are no longer referenced
    ///
    /// CList entries are identity, not liveness: a dropped export may be
    /// re-introduced by the peer later, so the entries stay. The notice is
    /// validated and acknowledged, nothing more.
    pub fn drop_exports(&mut self, slots: &[VatSlot]) -> Result<()> {
        self.crank(None, |_state, _syscall| {
            for slot in slots {
                if !slot.is_object() || !slot.allocated_by_self() {
                    return Err(Error::DropExportNotOwned {
                        slot: slot.to_string(),
                    });
                }
            }
            if !slots.is_empty() {
                info!(count = slots.len(), "exports dropped, retaining clist entries");
            }
            Ok(())
        })
    }

    fn route(
        state: &mut CommsState,
        syscall: &mut S,
        target: VatSlot,
        method: &str,
        args: &CapData,
        result: Option<VatSlot>,
    ) -> Result<()> {
        if target == CONTROLLER_SLOT {
            return Self::controller_delivery(state, syscall, method, args, result);
        }
        if let Some(remote_id) = state.remote_for_receiver(target) {
            if method != "receive" {
                return Err(Error::malformed_wire(format!(
                    "receiver only accepts receive, got {method:?}"
                )));
            }
            return DeliveryKit::new(state, syscall).message_from_remote(remote_id, args);
        }
        DeliveryKit::new(state, syscall).send_to_remote(target, method, args, result)
    }

    fn controller_delivery(
        state: &mut CommsState,
        syscall: &mut S,
        method: &str,
        args: &CapData,
        result: Option<VatSlot>,
    ) -> Result<()> {
        let op = ControllerOp::parse(method, args)?;
        let reply = op.apply(state)?;
        if let Some(result) = result {
            match reply {
                ControllerReply::Target(slot) => syscall.fulfill_to_target(result, slot)?,
                ControllerReply::Data(data) => syscall.fulfill_to_data(result, data)?,
            }
        }
        Ok(())
    }

    /// Run one crank with the shared failure policy
    ///
    /// Fatal errors flip the lifecycle to Terminated and propagate. Caller
    /// errors reject the result promise when there is one, otherwise they
    /// propagate with the vat still active.
    fn crank<F>(&mut self, result: Option<VatSlot>, op: F) -> Result<()>
    where
        F: FnOnce(&mut CommsState, &mut S) -> Result<()>,
    {
        if self.lifecycle == VatLifecycle::Terminated {
            return Err(Error::VatTerminated);
        }
        match op(&mut self.state, &mut self.syscall) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => {
                error!(%err, "protocol violation, terminating comms vat");
                self.lifecycle = VatLifecycle::Terminated;
                Err(err)
            }
            Err(err) => match result {
                Some(promise) => {
                    warn!(%err, "delivery refused, rejecting result");
                    let body = serde_json::to_string(&err.to_string())
                        .unwrap_or_else(|_| "\"delivery refused\"".to_string());
                    self.syscall
                        .notify_reject(promise, CapData::new(body, Vec::new()))?;
                    Ok(())
                }
                None => {
                    warn!(%err, "delivery refused");
                    Err(err)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::{RecordingSyscall, SyscallRecord};

    fn dispatch() -> CommsDispatch<RecordingSyscall> {
        CommsDispatch::new(CommsConfig::default(), RecordingSyscall::new()).unwrap()
    }

    fn add_remote(d: &mut CommsDispatch<RecordingSyscall>, name: &str) -> VatSlot {
        let args = CapData::new(format!("[{:?}]", name), vec![VatSlot::object(false, 10)]);
        let result = VatSlot::promise(false, 90);
        d.deliver(CONTROLLER_SLOT, "addRemote", &args, Some(result))
            .unwrap();
        match d.syscall().records().last().unwrap() {
            SyscallRecord::FulfillToTarget { promise, target } => {
                assert_eq!(*promise, result);
                *target
            }
            other => panic!("expected receiver reply, got {other:?}"),
        }
    }

    #[test]
    fn test_add_remote_answers_with_receiver() {
        let mut d = dispatch();
        let receiver = add_remote(&mut d, "machine-b");
        assert_eq!(receiver, VatSlot::object(true, 1));
        assert_eq!(d.debug().remote_count(), 1);
        assert!(d.debug().is_meta_object(receiver));
    }

    #[test]
    fn test_unknown_controller_op_rejects_and_stays_active() {
        let mut d = dispatch();
        let result = VatSlot::promise(false, 90);
        d.deliver(CONTROLLER_SLOT, "frobnicate", &CapData::empty(), Some(result))
            .unwrap();

        assert!(!d.is_terminated());
        assert_eq!(d.syscall().len(), 1);
        match &d.syscall().records()[0] {
            SyscallRecord::NotifyReject { promise, args } => {
                assert_eq!(*promise, result);
                assert!(args.body.contains("frobnicate"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_receiver_refuses_other_methods() {
        let mut d = dispatch();
        let receiver = add_remote(&mut d, "machine-b");
        let err = d
            .deliver(receiver, "sneak", &CapData::empty(), None)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(d.is_terminated());
    }

    #[test]
    fn test_terminated_vat_refuses_everything() {
        let mut d = dispatch();
        let receiver = add_remote(&mut d, "machine-b");
        let _ = d.deliver(receiver, "sneak", &CapData::empty(), None);
        assert!(d.is_terminated());

        let err = d
            .deliver(CONTROLLER_SLOT, "addRemote", &CapData::empty(), None)
            .unwrap_err();
        assert!(matches!(err, Error::VatTerminated));
    }

    #[test]
    fn test_drop_exports_is_validated_noop() {
        let mut d = dispatch();
        let receiver = add_remote(&mut d, "machine-b");
        d.syscall_mut().clear();

        d.drop_exports(&[receiver]).unwrap();
        assert!(d.syscall().is_empty());
        assert_eq!(d.debug().remote_count(), 1);

        // a bad vref anywhere in the slice refuses the whole notice
        let err = d
            .drop_exports(&[receiver, VatSlot::object(false, 3)])
            .unwrap_err();
        assert!(matches!(err, Error::DropExportNotOwned { .. }));
        assert!(d.syscall().is_empty());
        assert!(!d.is_terminated());
    }

    #[test]
    fn test_delivery_to_unknown_target_terminates() {
        let mut d = dispatch();
        let err = d
            .deliver(VatSlot::object(true, 77), "poke", &CapData::empty(), None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTarget { .. }));
        assert!(d.is_terminated());
    }
}
