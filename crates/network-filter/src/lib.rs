//! Network-filter crate: egress decisions, caller checks, and audit entries.
//!
//! - `egress`: lexical SSRF filter applied to every proxy target
//! - `peer`: loopback-only caller check for the local listener
//! - `types`: audit entry types shared with the gateway

pub mod egress;
pub mod peer;
pub mod types;

pub use {
    egress::{EgressDecision, RejectReason, decide, is_private_host},
    peer::is_loopback_peer,
    types::*,
};
