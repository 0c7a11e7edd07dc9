//! Selkie Core
//!
//! Core types, errors, and constants for the Selkie inter-machine
//! object-capability comms layer.
//!
//! # Overview
//!
//! Selkie is the comms vat of a capability-secure, deterministic execution
//! kernel: it makes a message sent to an object on another machine look,
//! from the local kernel's point of view, identical to a message sent to a
//! local object. This crate holds the leaf types shared by the protocol
//! engine and by kernel-side consumers.
//!
//! # TigerStyle
//!
//! This crate follows TigerStyle engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `REMOTE_NAME_LENGTH_BYTES_MAX`)
//! - Explicit validation on construction
//! - No recursion (bounded iteration only)

pub mod capdata;
pub mod config;
pub mod constants;
pub mod error;
pub mod slot;

pub use capdata::CapData;
pub use config::CommsConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use slot::{RemoteId, SlotKind, VatSlot};
