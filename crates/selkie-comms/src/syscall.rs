//! Kernel syscall seam
//!
//! TigerStyle: Explicit trait at the boundary, test double included.
//!
//! The comms vat consumes a fixed kernel syscall surface. Everything it does
//! to the outside world goes through this trait, which keeps the protocol
//! engine deterministic and testable: feed it deliveries, record what it
//! asks the kernel to do.

use selkie_core::{CapData, Result, VatSlot};

/// A promise settlement, as exchanged with the kernel
///
/// Used both for `notify` input (the kernel telling comms a subscribed
/// promise settled) and for the resolution syscalls comms issues when a
/// settlement arrives over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The promise fulfilled to plain data (possibly referencing slots)
    FulfillToData { promise: VatSlot, args: CapData },
    /// The promise fulfilled to a single target object
    FulfillToTarget { promise: VatSlot, target: VatSlot },
    /// The promise was rejected
    Reject { promise: VatSlot, args: CapData },
}

impl Resolution {
    /// The promise slot being settled
    pub fn promise(&self) -> VatSlot {
        match self {
            Self::FulfillToData { promise, .. } => *promise,
            Self::FulfillToTarget { promise, .. } => *promise,
            Self::Reject { promise, .. } => *promise,
        }
    }
}

/// Kernel syscall surface consumed by the comms vat
///
/// Signatures are fixed by the kernel; the comms layer is one consumer
/// among many vats.
pub trait Syscall {
    /// Queue a message to a kernel object or promise, optionally asking the
    /// kernel to route its result to `result`
    fn send(
        &mut self,
        target: VatSlot,
        method: &str,
        args: CapData,
        result: Option<VatSlot>,
    ) -> Result<()>;

    /// Ask the kernel to notify this vat when `promise` settles
    fn subscribe(&mut self, promise: VatSlot) -> Result<()>;

    /// Settle a promise this vat decides, fulfilling to data
    fn fulfill_to_data(&mut self, promise: VatSlot, args: CapData) -> Result<()>;

    /// Settle a promise this vat decides, fulfilling to a target object
    fn fulfill_to_target(&mut self, promise: VatSlot, target: VatSlot) -> Result<()>;

    /// Settle a promise this vat decides, rejecting it
    fn notify_reject(&mut self, promise: VatSlot, args: CapData) -> Result<()>;

    /// Settle a batch of promises
    fn resolve(&mut self, resolutions: Vec<Resolution>) -> Result<()> {
        for resolution in resolutions {
            match resolution {
                Resolution::FulfillToData { promise, args } => {
                    self.fulfill_to_data(promise, args)?;
                }
                Resolution::FulfillToTarget { promise, target } => {
                    self.fulfill_to_target(promise, target)?;
                }
                Resolution::Reject { promise, args } => {
                    self.notify_reject(promise, args)?;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Recording syscall for testing
// =============================================================================

/// One recorded kernel syscall
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallRecord {
    Send {
        target: VatSlot,
        method: String,
        args: CapData,
        result: Option<VatSlot>,
    },
    Subscribe {
        promise: VatSlot,
    },
    FulfillToData {
        promise: VatSlot,
        args: CapData,
    },
    FulfillToTarget {
        promise: VatSlot,
        target: VatSlot,
    },
    NotifyReject {
        promise: VatSlot,
        args: CapData,
    },
}

/// In-memory syscall recorder for testing
///
/// Captures every syscall in order, simulating the kernel boundary the way
/// an in-memory transport simulates a network.
#[derive(Debug, Default)]
pub struct RecordingSyscall {
    records: Vec<SyscallRecord>,
}

impl RecordingSyscall {
    /// Create a new recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded syscalls, in issue order
    pub fn records(&self) -> &[SyscallRecord] {
        &self.records
    }

    /// Number of recorded syscalls
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The recorded `send` calls addressed to `target`
    pub fn sends_to(&self, target: VatSlot) -> Vec<&SyscallRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r, SyscallRecord::Send { target: t, .. } if *t == target))
            .collect()
    }
}

impl Syscall for RecordingSyscall {
    fn send(
        &mut self,
        target: VatSlot,
        method: &str,
        args: CapData,
        result: Option<VatSlot>,
    ) -> Result<()> {
        self.records.push(SyscallRecord::Send {
            target,
            method: method.to_string(),
            args,
            result,
        });
        Ok(())
    }

    fn subscribe(&mut self, promise: VatSlot) -> Result<()> {
        self.records.push(SyscallRecord::Subscribe { promise });
        Ok(())
    }

    fn fulfill_to_data(&mut self, promise: VatSlot, args: CapData) -> Result<()> {
        self.records
            .push(SyscallRecord::FulfillToData { promise, args });
        Ok(())
    }

    fn fulfill_to_target(&mut self, promise: VatSlot, target: VatSlot) -> Result<()> {
        self.records
            .push(SyscallRecord::FulfillToTarget { promise, target });
        Ok(())
    }

    fn notify_reject(&mut self, promise: VatSlot, args: CapData) -> Result<()> {
        self.records
            .push(SyscallRecord::NotifyReject { promise, args });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_syscall_captures_order() {
        let mut syscall = RecordingSyscall::new();
        syscall
            .send(VatSlot::object(true, 1), "hello", CapData::empty(), None)
            .unwrap();
        syscall.subscribe(VatSlot::promise(true, 2)).unwrap();

        assert_eq!(syscall.len(), 2);
        assert!(matches!(syscall.records()[0], SyscallRecord::Send { .. }));
        assert!(matches!(
            syscall.records()[1],
            SyscallRecord::Subscribe { .. }
        ));
    }

    #[test]
    fn test_resolve_dispatches_to_specific_syscalls() {
        let mut syscall = RecordingSyscall::new();
        syscall
            .resolve(vec![
                Resolution::FulfillToData {
                    promise: VatSlot::promise(true, 1),
                    args: CapData::empty(),
                },
                Resolution::Reject {
                    promise: VatSlot::promise(true, 2),
                    args: CapData::empty(),
                },
            ])
            .unwrap();

        assert!(matches!(
            syscall.records()[0],
            SyscallRecord::FulfillToData { .. }
        ));
        assert!(matches!(
            syscall.records()[1],
            SyscallRecord::NotifyReject { .. }
        ));
    }

    #[test]
    fn test_sends_to_filters_by_target() {
        let mut syscall = RecordingSyscall::new();
        let a = VatSlot::object(true, 1);
        let b = VatSlot::object(true, 2);
        syscall.send(a, "x", CapData::empty(), None).unwrap();
        syscall.send(b, "y", CapData::empty(), None).unwrap();
        syscall.send(a, "z", CapData::empty(), None).unwrap();

        assert_eq!(syscall.sends_to(a).len(), 2);
        assert_eq!(syscall.sends_to(b).len(), 1);
    }
}
