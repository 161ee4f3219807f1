//! Append-only record of every poll created during the process lifetime.
//!
//! Entries keep the full snapshot. What goes on the wire is split into pages
//! of summaries (no per-connection responses) that each fit one datagram.

use log::warn;
use shared::{PollId, PollSnapshot, HISTORY_PAGE_BUDGET};

#[derive(Debug, Default)]
pub struct SessionHistory {
    entries: Vec<PollSnapshot>,
    /// Bumped on every change so clients can tell page sets apart
    revision: u64,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly created poll. Entries stay in creation order.
    pub fn append(&mut self, snapshot: PollSnapshot) {
        self.entries.push(snapshot);
        self.revision += 1;
    }

    /// Replaces the entry of the same poll instance with a newer snapshot.
    ///
    /// Matching is by poll id, so two polls sharing a question never clash.
    /// Returns false if the poll was never appended.
    pub fn update(&mut self, snapshot: PollSnapshot) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == snapshot.id) {
            Some(entry) => {
                *entry = snapshot;
                self.revision += 1;
                true
            }
            None => {
                warn!("No history entry for {}", snapshot.id);
                false
            }
        }
    }

    pub fn get(&self, id: PollId) -> Option<&PollSnapshot> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn snapshot_all(&self) -> Vec<PollSnapshot> {
        self.entries.clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Summaries of all entries, split so no page exceeds `budget` bytes.
    ///
    /// Always yields at least one page, empty for an empty history. An entry
    /// that alone exceeds the budget is left out.
    pub fn pages(&self, budget: usize) -> Vec<Vec<PollSnapshot>> {
        let mut pages = Vec::new();
        let mut page = Vec::new();
        let mut used = 0usize;

        for entry in &self.entries {
            let summary = entry.summary();
            let size = match bincode::serialized_size(&summary) {
                Ok(size) => size as usize,
                Err(e) => {
                    warn!("Cannot size history entry {}: {}", entry.id, e);
                    continue;
                }
            };
            if size > budget {
                warn!("History entry {} is {} bytes, leaving it out", entry.id, size);
                continue;
            }
            if used + size > budget {
                pages.push(std::mem::take(&mut page));
                used = 0;
            }
            page.push(summary);
            used += size;
        }

        pages.push(page);
        pages
    }

    /// Pages sized for one datagram each
    pub fn wire_pages(&self) -> Vec<Vec<PollSnapshot>> {
        self.pages(HISTORY_PAGE_BUDGET)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
