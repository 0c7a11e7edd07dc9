//! Read-only inspection of a live comms vat
//!
//! Handed out explicitly by the dispatch layer, so tooling never needs a
//! side channel into vat internals.

use crate::state::CommsState;
use selkie_core::{RemoteId, VatSlot};

/// Borrowed, read-only view of the vat state
#[derive(Debug, Clone, Copy)]
pub struct DebugView<'a> {
    state: &'a CommsState,
}

/// Snapshot of one remote's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSummary {
    pub id: RemoteId,
    pub name: String,
    pub clist_entries: usize,
    pub next_send_seq_num: u64,
    pub last_received_seq_num: u64,
    pub peer_ack_seq_num: u64,
}

impl<'a> DebugView<'a> {
    pub(crate) fn new(state: &'a CommsState) -> Self {
        Self { state }
    }

    pub fn remote_count(&self) -> usize {
        self.state.remote_count()
    }

    pub fn pending_promise_count(&self) -> usize {
        self.state.pending_count()
    }

    pub fn is_meta_object(&self, slot: VatSlot) -> bool {
        self.state.is_meta_object(slot)
    }

    /// Counters for one remote, by registered name
    pub fn remote_summary(&self, name: &str) -> Option<RemoteSummary> {
        let id = self.state.remote_id_by_name(name)?;
        let remote = self.state.remote(id)?;
        Some(RemoteSummary {
            id,
            name: remote.name().to_string(),
            clist_entries: remote.clist.len(),
            next_send_seq_num: remote.next_send_seq_num(),
            last_received_seq_num: remote.last_received_seq_num(),
            peer_ack_seq_num: remote.peer_ack_seq_num(),
        })
    }

    /// Summaries for every registered remote, in id order
    pub fn remote_summaries(&self) -> Vec<RemoteSummary> {
        self.state
            .remotes()
            .map(|remote| RemoteSummary {
                id: remote.id(),
                name: remote.name().to_string(),
                clist_entries: remote.clist.len(),
                next_send_seq_num: remote.next_send_seq_num(),
                last_received_seq_num: remote.last_received_seq_num(),
                peer_ack_seq_num: remote.peer_ack_seq_num(),
            })
            .collect()
    }
}
