//! Identity tracking for foreign keys across a batch.
//!
//! Conventions replace foreign keys wholesale: the old record is
//! tombstoned and a new one with a fresh id takes its place. A caller that
//! opened a batch around such work still wants "the same relationship"
//! back afterwards. The tracker bridges the two: the caller registers the
//! id it cares about before the drain, replacement sites report every
//! old-to-new swap, and after convergence the caller reads back whatever
//! id its registration now points at.

use crate::ids::ForeignKeyId;

/// Proof of an active tracker registration. Not cloneable; resolving and
/// releasing consume the caller's only handle.
#[derive(Debug)]
pub struct TrackerTicket {
    slot: usize,
}

/// Follows foreign-key identity through replacements.
///
/// Owned by the dispatcher; batch handles register interest, the
/// replacement path reports swaps.
#[derive(Debug, Default)]
pub struct MetadataTracker {
    slots: Vec<Option<ForeignKeyId>>,
}

impl MetadataTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `foreign_key` and returns the ticket to read
    /// it back with. Released slots are reused.
    pub(crate) fn track(&mut self, foreign_key: ForeignKeyId) -> TrackerTicket {
        if let Some(slot) = self.slots.iter().position(Option::is_none) {
            self.slots[slot] = Some(foreign_key);
            return TrackerTicket { slot };
        }
        self.slots.push(Some(foreign_key));
        TrackerTicket {
            slot: self.slots.len() - 1,
        }
    }

    /// Retargets every active registration of `old` to `new`.
    pub(crate) fn update(&mut self, old: ForeignKeyId, new: ForeignKeyId) {
        for slot in self.slots.iter_mut().flatten() {
            if *slot == old {
                *slot = new;
            }
        }
    }

    /// The id a registration currently points at.
    pub(crate) fn current(&self, ticket: &TrackerTicket) -> Option<ForeignKeyId> {
        self.slots.get(ticket.slot).copied().flatten()
    }

    /// Ends a registration and frees its slot.
    pub(crate) fn release(&mut self, ticket: TrackerTicket) {
        if let Some(slot) = self.slots.get_mut(ticket.slot) {
            *slot = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_then_current_round_trips() {
        let mut tracker = MetadataTracker::new();
        let fk = ForeignKeyId::new();
        let ticket = tracker.track(fk);
        assert_eq!(tracker.current(&ticket), Some(fk));
    }

    #[test]
    fn test_update_retargets_all_matching_registrations() {
        let mut tracker = MetadataTracker::new();
        let old = ForeignKeyId::new();
        let new = ForeignKeyId::new();
        let other = ForeignKeyId::new();
        let a = tracker.track(old);
        let b = tracker.track(old);
        let c = tracker.track(other);

        tracker.update(old, new);

        assert_eq!(tracker.current(&a), Some(new));
        assert_eq!(tracker.current(&b), Some(new));
        assert_eq!(tracker.current(&c), Some(other));
    }

    #[test]
    fn test_chained_updates_follow_the_latest_identity() {
        let mut tracker = MetadataTracker::new();
        let first = ForeignKeyId::new();
        let second = ForeignKeyId::new();
        let third = ForeignKeyId::new();
        let ticket = tracker.track(first);

        tracker.update(first, second);
        tracker.update(second, third);

        assert_eq!(tracker.current(&ticket), Some(third));
    }

    #[test]
    fn test_release_frees_the_slot_for_reuse() {
        let mut tracker = MetadataTracker::new();
        let ticket = tracker.track(ForeignKeyId::new());
        tracker.release(ticket);
        assert_eq!(tracker.active_count(), 0);

        let reused = tracker.track(ForeignKeyId::new());
        assert_eq!(reused.slot, 0);
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn test_update_after_release_does_not_resurrect() {
        let mut tracker = MetadataTracker::new();
        let old = ForeignKeyId::new();
        let ticket = tracker.track(old);
        tracker.release(ticket);
        tracker.update(old, ForeignKeyId::new());
        assert_eq!(tracker.active_count(), 0);
    }
}
