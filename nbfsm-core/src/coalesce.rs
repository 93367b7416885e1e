//! Bookkeeping for coalesced events.
//!
//! Every coalesced event is enrolled in its group when it is submitted and
//! receives a ticket. The registry remembers, per group, the ticket that is
//! currently entitled to run. Enrolment happens on the submitting thread and
//! claiming happens on the worker; the registry has its own lock so neither
//! side ever waits on a transition in progress.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Which member of a group of coalesced events gets evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coalesce {
    /// The earliest submitted member runs; later members of the same batch
    /// are dropped without being evaluated.
    First,
    /// The latest submitted member runs; each new member pre-empts the ones
    /// submitted before it.
    MostRecent,
}

#[derive(Debug, Default)]
struct Groups {
    next_ticket: u64,
    winners: HashMap<Arc<str>, u64>,
}

#[derive(Debug, Default)]
pub(crate) struct CoalescingRegistry {
    groups: Mutex<Groups>,
}

impl CoalescingRegistry {
    /// Enrols a new member of `key` and returns its ticket.
    pub(crate) fn enroll(&self, key: &Arc<str>, policy: Coalesce) -> u64 {
        let mut groups = self.groups.lock();
        groups.next_ticket += 1;
        let ticket = groups.next_ticket;
        match policy {
            Coalesce::First => {
                groups.winners.entry(key.clone()).or_insert(ticket);
            }
            Coalesce::MostRecent => {
                groups.winners.insert(key.clone(), ticket);
            }
        }
        ticket
    }

    /// Claims the group for `ticket`, ending the batch.
    ///
    /// Returns `false` when another member holds the group or the batch has
    /// already been claimed.
    pub(crate) fn claim(&self, key: &str, ticket: u64) -> bool {
        let mut groups = self.groups.lock();
        if groups.winners.get(key) == Some(&ticket) {
            groups.winners.remove(key);
            true
        } else {
            false
        }
    }

    /// Gives up the group without evaluating, if `ticket` holds it.
    pub(crate) fn release(&self, key: &str, ticket: u64) {
        self.claim(key, ticket);
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, key: &str) -> bool {
        self.groups.lock().winners.contains_key(key)
    }
}
