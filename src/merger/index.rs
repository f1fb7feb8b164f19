//! Channel identifier to storage slot mapping

use std::collections::BTreeMap;

use crate::common::ChannelId;

/// Append-only mapping from channel identifier to dense storage slot
///
/// Slots are handed out in order of first appearance and never reassigned
/// during a run. Iteration is by ascending channel identifier, which is the
/// order all reports and dumps use.
#[derive(Debug, Clone, Default)]
pub struct ChannelIndex {
    slots: BTreeMap<ChannelId, usize>,
}

impl ChannelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `id`, assigning the next free slot on first encounter
    ///
    /// Returns the slot and whether it was newly assigned.
    pub fn slot_or_insert(&mut self, id: ChannelId) -> (usize, bool) {
        let next = self.slots.len();
        let mut inserted = false;
        let slot = *self.slots.entry(id).or_insert_with(|| {
            inserted = true;
            next
        });
        (slot, inserted)
    }

    pub fn get(&self, id: ChannelId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// (channel, slot) pairs by ascending channel identifier
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, usize)> + '_ {
        self.slots.iter().map(|(id, slot)| (*id, *slot))
    }
}
