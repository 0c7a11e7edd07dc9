//! Selkie Comms
//!
//! Protocol engine for the Selkie inter-machine object-capability comms
//! layer.
//!
//! # Overview
//!
//! This crate is the comms vat itself: it receives kernel deliveries through
//! [`CommsDispatch`], translates capability references through per-remote
//! CLists, frames outbound messages with sequence and ack numbers, and turns
//! inbound wire messages back into kernel syscalls. All state is owned by
//! the dispatch layer and threaded explicitly; nothing here uses globals,
//! clocks, or threads, so a given delivery sequence always produces the same
//! syscalls and the same wire bytes.
//!
//! # Architecture
//!
//! ```text
//!   kernel deliveries            wire messages
//!        |                            ^
//!        v                            |
//!   CommsDispatch ---> DeliveryKit --+--> Syscall (transmit)
//!        |                  |
//!        v                  v
//!    CommsState        per-remote CList
//! ```
//!
//! # TigerStyle
//!
//! This crate follows TigerStyle engineering principles:
//! - Safety > Performance > Developer Experience
//! - Protocol violations halt the vat instead of guessing
//! - Deterministic identifier and sequence allocation
//! - Explicit state ownership, no globals

pub mod clist;
pub mod controller;
pub mod debug;
pub mod delivery;
pub mod dispatch;
pub mod remote;
pub mod state;
pub mod syscall;
pub mod wire;

pub use clist::CList;
pub use controller::{ControllerOp, ControllerReply};
pub use debug::{DebugView, RemoteSummary};
pub use delivery::DeliveryKit;
pub use dispatch::{CommsDispatch, VatLifecycle};
pub use remote::Remote;
pub use state::{CommsState, Decider, PendingResolution, CONTROLLER_SLOT};
pub use syscall::{RecordingSyscall, Resolution, Syscall, SyscallRecord};
pub use wire::{Envelope, WireCall, WireEvent, WireEventKind, WireMessage};
