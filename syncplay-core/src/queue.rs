//! Group play queue (spec §4.1)
//!
//! Items live in a canonical `Vec<QueueItem>` that never reorders on its own;
//! `shuffled_order` is a permutation of canonical indices used only when
//! `ShuffleMode::Shuffle` is active. This keeps a playlist-item-id's identity
//! stable across shuffle toggles instead of materializing two divergent
//! vectors that can drift apart.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatMode {
    RepeatOne,
    RepeatAll,
    RepeatNone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShuffleMode {
    Sorted,
    Shuffle,
}

/// A single entry in the play queue.
///
/// `playlist_item_id` is the stable identity clients reference (e.g. in
/// `SetPlaylistItem`); `item_id` is the underlying library item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub playlist_item_id: String,
    pub item_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct PlayQueue {
    items: Vec<QueueItem>,
    /// Permutation of canonical indices, populated when shuffled.
    shuffled_order: Vec<usize>,
    shuffle_mode: ShuffleMode,
    repeat_mode: RepeatMode,
    /// Canonical-order index of the currently playing item, if any.
    playing_index: Option<usize>,
    next_playlist_item_id: u64,
    /// Monotonic counter bumped by every mutating op (spec §4.1/§5/§8).
    change_version: u64,
    last_change: DateTime<Utc>,
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayQueue {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            shuffled_order: Vec::new(),
            shuffle_mode: ShuffleMode::Sorted,
            repeat_mode: RepeatMode::RepeatNone,
            playing_index: None,
            next_playlist_item_id: 1,
            change_version: 0,
            last_change: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn change_version(&self) -> u64 {
        self.change_version
    }

    pub fn last_change(&self) -> DateTime<Utc> {
        self.last_change
    }

    fn bump(&mut self, now: DateTime<Utc>) {
        self.change_version += 1;
        self.last_change = now;
    }

    fn mint_playlist_item_id(&mut self) -> String {
        let id = self.next_playlist_item_id;
        self.next_playlist_item_id += 1;
        id.to_string()
    }

    /// The order in which `Next`/`Previous` and the client-facing playlist
    /// traverse items: canonical order when sorted, the permutation otherwise.
    fn traversal_order(&self) -> Vec<usize> {
        match self.shuffle_mode {
            ShuffleMode::Sorted => (0..self.items.len()).collect(),
            ShuffleMode::Shuffle => self.shuffled_order.clone(),
        }
    }

    fn position_in_traversal(&self, canonical_index: usize) -> Option<usize> {
        self.traversal_order()
            .iter()
            .position(|&idx| idx == canonical_index)
    }

    fn reshuffle(&mut self) {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.shuffle(&mut thread_rng());
        // Keep the currently playing item first so a shuffle toggle mid-playback
        // doesn't jump the cursor (spec §4.1).
        if let Some(playing) = self.playing_index {
            if let Some(pos) = order.iter().position(|&idx| idx == playing) {
                order.swap(0, pos);
            }
        }
        self.shuffled_order = order;
    }

    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode, now: DateTime<Utc>) {
        self.shuffle_mode = mode;
        if mode == ShuffleMode::Shuffle {
            self.reshuffle();
        }
        self.bump(now);
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode, now: DateTime<Utc>) {
        self.repeat_mode = mode;
        self.bump(now);
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replaces the entire queue, minting fresh playlist-item-ids.
    pub fn set_playlist(&mut self, item_ids: Vec<Uuid>, now: DateTime<Utc>) -> Vec<String> {
        self.items.clear();
        self.playing_index = None;
        let mut minted = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let playlist_item_id = self.mint_playlist_item_id();
            minted.push(playlist_item_id.clone());
            self.items.push(QueueItem {
                playlist_item_id,
                item_id,
            });
        }
        if self.shuffle_mode == ShuffleMode::Shuffle {
            self.reshuffle();
        } else {
            self.shuffled_order = (0..self.items.len()).collect();
        }
        self.bump(now);
        minted
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// The order clients should render the playlist in (spec §6's `PlayQueue` update).
    pub fn ordered_items(&self) -> Vec<&QueueItem> {
        self.traversal_order()
            .into_iter()
            .map(|idx| &self.items[idx])
            .collect()
    }

    pub fn playing_item(&self) -> Option<&QueueItem> {
        self.playing_index.and_then(|idx| self.items.get(idx))
    }

    fn index_of(&self, playlist_item_id: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.playlist_item_id == playlist_item_id)
    }

    pub fn set_playing_item_by_index(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.playing_index = Some(index);
            true
        } else {
            false
        }
    }

    pub fn set_playing_item_by_playlist_id(&mut self, playlist_item_id: &str) -> bool {
        match self.index_of(playlist_item_id) {
            Some(idx) => {
                self.playing_index = Some(idx);
                true
            }
            None => false,
        }
    }

    pub fn set_playing_item_by_item_id(&mut self, item_id: Uuid) -> bool {
        match self.items.iter().position(|i| i.item_id == item_id) {
            Some(idx) => {
                self.playing_index = Some(idx);
                true
            }
            None => false,
        }
    }

    /// Appends items to the end of the canonical order.
    pub fn queue(&mut self, item_ids: Vec<Uuid>, now: DateTime<Utc>) -> Vec<String> {
        let mut minted = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let playlist_item_id = self.mint_playlist_item_id();
            minted.push(playlist_item_id.clone());
            let canonical_index = self.items.len();
            self.items.push(QueueItem {
                playlist_item_id,
                item_id,
            });
            if self.shuffle_mode == ShuffleMode::Shuffle {
                self.shuffled_order.push(canonical_index);
            }
        }
        if self.shuffle_mode == ShuffleMode::Sorted {
            self.shuffled_order = (0..self.items.len()).collect();
        }
        self.bump(now);
        minted
    }

    /// Inserts items immediately after the currently playing item, in
    /// canonical order (SPEC_FULL.md §4.1: QueueNext always targets canonical
    /// order, even under Shuffle, since canonical order is the stable backing
    /// store and "next" in a shuffled queue has no other well-defined meaning).
    pub fn queue_next(&mut self, item_ids: Vec<Uuid>, now: DateTime<Utc>) -> Vec<String> {
        let insert_at = self.playing_index.map(|idx| idx + 1).unwrap_or(0);
        let mut minted = Vec::with_capacity(item_ids.len());
        let mut new_items = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let playlist_item_id = self.mint_playlist_item_id();
            minted.push(playlist_item_id.clone());
            new_items.push(QueueItem {
                playlist_item_id,
                item_id,
            });
        }
        let inserted = new_items.len();
        for (offset, item) in new_items.into_iter().enumerate() {
            self.items.insert(insert_at + offset, item);
        }
        // Canonical indices at or after the insertion point shifted; rebuild
        // both the playing cursor and the shuffle permutation accordingly.
        if let Some(playing) = self.playing_index {
            if playing >= insert_at {
                self.playing_index = Some(playing + inserted);
            }
        }
        if self.shuffle_mode == ShuffleMode::Shuffle {
            for idx in self.shuffled_order.iter_mut() {
                if *idx >= insert_at {
                    *idx += inserted;
                }
            }
            let new_indices: Vec<usize> = (insert_at..insert_at + inserted).collect();
            let splice_at = self
                .playing_index
                .map(|p| self.position_in_traversal(p).map(|pos| pos + 1).unwrap_or(0))
                .unwrap_or(0);
            let splice_at = splice_at.min(self.shuffled_order.len());
            for (offset, idx) in new_indices.into_iter().enumerate() {
                self.shuffled_order.insert(splice_at + offset, idx);
            }
        } else {
            self.shuffled_order = (0..self.items.len()).collect();
        }
        self.bump(now);
        minted
    }

    /// Removes items by playlist-item-id, returning the library item ids removed.
    ///
    /// Removing the currently playing item advances the cursor to whatever
    /// was its successor in traversal order, rather than clearing it — the
    /// queue keeps playing forward (spec §8 seed scenario 5).
    pub fn remove_from_playlist(&mut self, playlist_item_ids: &[String], now: DateTime<Utc>) -> Vec<Uuid> {
        let successor_pid = self.playing_item().and_then(|playing| {
            let canonical_idx = self.index_of(&playing.playlist_item_id)?;
            let order = self.traversal_order();
            let pos = order.iter().position(|&idx| idx == canonical_idx)?;
            order.get(pos + 1).map(|&idx| self.items[idx].playlist_item_id.clone())
        });

        let mut removed = Vec::new();
        for pid in playlist_item_ids {
            if let Some(idx) = self.index_of(pid) {
                removed.push(self.items[idx].item_id);
                self.items.remove(idx);
                self.shuffled_order.retain(|&i| i != idx);
                for i in self.shuffled_order.iter_mut() {
                    if *i > idx {
                        *i -= 1;
                    }
                }
                self.playing_index = self.playing_index.and_then(|p| {
                    if p == idx {
                        None
                    } else if p > idx {
                        Some(p - 1)
                    } else {
                        Some(p)
                    }
                });
            }
        }
        // The playing item was among those removed: advance to its recorded
        // successor, or the new first item in traversal order, or nothing.
        if self.playing_index.is_none() {
            self.playing_index = successor_pid
                .as_deref()
                .and_then(|pid| self.index_of(pid))
                .or_else(|| self.traversal_order().first().copied());
        }
        self.bump(now);
        removed
    }

    pub fn move_playlist_item(&mut self, playlist_item_id: &str, new_index: usize, now: DateTime<Utc>) -> bool {
        let Some(old_index) = self.index_of(playlist_item_id) else {
            return false;
        };
        let new_index = new_index.min(self.items.len().saturating_sub(1));
        if old_index == new_index {
            return true;
        }
        let item = self.items.remove(old_index);
        self.items.insert(new_index, item);

        let remap = |idx: usize| -> usize {
            if idx == old_index {
                new_index
            } else if old_index < new_index && idx > old_index && idx <= new_index {
                idx - 1
            } else if new_index < old_index && idx >= new_index && idx < old_index {
                idx + 1
            } else {
                idx
            }
        };
        self.shuffled_order = self.shuffled_order.iter().map(|&i| remap(i)).collect();
        self.playing_index = self.playing_index.map(remap);
        self.bump(now);
        true
    }

    /// Advances to the next item per `repeat_mode` and the active traversal
    /// order. Returns `false` if there is nothing left to play.
    pub fn advance_next(&mut self, now: DateTime<Utc>) -> bool {
        if self.items.is_empty() {
            return false;
        }
        if self.repeat_mode == RepeatMode::RepeatOne {
            return self.playing_index.is_some();
        }
        let order = self.traversal_order();
        let current_pos = self
            .playing_index
            .and_then(|idx| order.iter().position(|&i| i == idx));
        let next_pos = match current_pos {
            Some(pos) if pos + 1 < order.len() => Some(pos + 1),
            Some(_) if self.repeat_mode == RepeatMode::RepeatAll => Some(0),
            None => Some(0),
            _ => None,
        };
        match next_pos {
            Some(pos) => {
                self.playing_index = Some(order[pos]);
                self.bump(now);
                true
            }
            None => {
                self.playing_index = None;
                self.bump(now);
                false
            }
        }
    }

    pub fn advance_previous(&mut self, now: DateTime<Utc>) -> bool {
        if self.items.is_empty() {
            return false;
        }
        let order = self.traversal_order();
        let current_pos = self
            .playing_index
            .and_then(|idx| order.iter().position(|&i| i == idx));
        let prev_pos = match current_pos {
            Some(pos) if pos > 0 => Some(pos - 1),
            Some(_) if self.repeat_mode == RepeatMode::RepeatAll => Some(order.len() - 1),
            _ => None,
        };
        match prev_pos {
            Some(pos) => {
                self.playing_index = Some(order[pos]);
                self.bump(now);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn set_playlist_mints_sequential_ids() {
        let mut q = PlayQueue::new();
        let minted = q.set_playlist(ids(3), Utc::now());
        assert_eq!(minted, vec!["1", "2", "3"]);
    }

    #[test]
    fn queue_next_inserts_after_playing_item_in_canonical_order() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(3), Utc::now());
        q.set_playing_item_by_index(0);
        let minted = q.queue_next(ids(1), Utc::now());
        assert_eq!(minted, vec!["4"]);
        let order: Vec<&str> = q
            .ordered_items()
            .iter()
            .map(|i| i.playlist_item_id.as_str())
            .collect();
        assert_eq!(order, vec!["1", "4", "2", "3"]);
    }

    #[test]
    fn shuffle_keeps_playing_item_first_in_traversal() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(5), Utc::now());
        q.set_playing_item_by_index(2);
        q.set_shuffle_mode(ShuffleMode::Shuffle, Utc::now());
        assert_eq!(q.ordered_items()[0].playlist_item_id, "3");
    }

    #[test]
    fn removing_playing_item_advances_to_successor() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(2), Utc::now());
        q.set_playing_item_by_index(0);
        q.remove_from_playlist(&["1".to_string()], Utc::now());
        assert_eq!(q.playing_item().unwrap().playlist_item_id, "2");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn removing_the_only_item_clears_cursor() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(1), Utc::now());
        q.set_playing_item_by_index(0);
        q.remove_from_playlist(&["1".to_string()], Utc::now());
        assert!(q.playing_item().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn advance_next_respects_repeat_all_wraparound() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(2), Utc::now());
        q.set_repeat_mode(RepeatMode::RepeatAll, Utc::now());
        q.set_playing_item_by_index(1);
        assert!(q.advance_next(Utc::now()));
        assert_eq!(q.playing_item().unwrap().playlist_item_id, "1");
    }

    #[test]
    fn advance_next_stops_at_end_without_repeat() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(2), Utc::now());
        q.set_playing_item_by_index(1);
        assert!(!q.advance_next(Utc::now()));
        assert!(q.playing_item().is_none());
    }

    #[test]
    fn repeat_one_stays_on_same_item() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(2), Utc::now());
        q.set_repeat_mode(RepeatMode::RepeatOne, Utc::now());
        q.set_playing_item_by_index(0);
        assert!(q.advance_next(Utc::now()));
        assert_eq!(q.playing_item().unwrap().playlist_item_id, "1");
    }

    #[test]
    fn move_playlist_item_updates_playing_cursor() {
        let mut q = PlayQueue::new();
        q.set_playlist(ids(3), Utc::now());
        q.set_playing_item_by_index(0);
        assert!(q.move_playlist_item("1", 2, Utc::now()));
        assert_eq!(q.playing_item().unwrap().playlist_item_id, "1");
        let order: Vec<&str> = q
            .ordered_items()
            .iter()
            .map(|i| i.playlist_item_id.as_str())
            .collect();
        assert_eq!(order, vec!["2", "3", "1"]);
    }

    #[test]
    fn every_mutating_op_bumps_change_version() {
        let mut q = PlayQueue::new();
        assert_eq!(q.change_version(), 0);
        q.set_playlist(ids(2), Utc::now());
        assert_eq!(q.change_version(), 1);
        q.set_playing_item_by_index(0);
        // Cursor moves alone are not list-level changes and don't bump.
        assert_eq!(q.change_version(), 1);
        q.queue(ids(1), Utc::now());
        assert_eq!(q.change_version(), 2);
        let now = Utc::now();
        q.set_shuffle_mode(ShuffleMode::Shuffle, now);
        assert_eq!(q.change_version(), 3);
        assert_eq!(q.last_change(), now);
        q.move_playlist_item("1", 1, Utc::now());
        assert_eq!(q.change_version(), 4);
        q.remove_from_playlist(&["2".to_string()], Utc::now());
        assert_eq!(q.change_version(), 5);
    }
}
