//! Track identity and selection state
//!
//! Every extracted track gets two identities:
//!
//! - `id` = `"{file_index}-{track_index}"`, positional. It is what reorder and delete
//!   requests refer to, and it changes when files before it are removed.
//! - `unique_key` = `"{file_name}:{track_index}:{track_name}"`. Deletions are recorded
//!   by this key so they survive re-extraction after unrelated changes.
//!
//! Track payloads live in an arena; the live sequence is a list of arena indices, so
//! reorders and deletes never copy coordinates.

use crate::track::{CoordinateSequence, FileTracks, Track};
use crate::{KmzError, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A track as presented for selection
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackItem {
    pub id: String,
    pub name: String,
    pub coordinates: CoordinateSequence,
    pub file_index: usize,
    pub file_name: String,
    pub unique_key: String,
}

impl TrackItem {
    pub fn from_track(track: &Track, file_name: &str) -> Self {
        Self {
            id: Self::make_id(track.source_file_index, track.source_track_index),
            name: track.name.clone(),
            coordinates: track.coordinates.clone(),
            file_index: track.source_file_index,
            file_name: file_name.to_string(),
            unique_key: Self::make_unique_key(file_name, track.source_track_index, &track.name),
        }
    }

    #[inline]
    pub fn make_id(file_index: usize, track_index: usize) -> String {
        format!("{file_index}-{track_index}")
    }

    #[inline]
    pub fn make_unique_key(file_name: &str, track_index: usize, track_name: &str) -> String {
        format!("{file_name}:{track_index}:{track_name}")
    }
}

/// Result of deleting a track from the live sequence
#[derive(Clone, Debug)]
pub struct DeleteOutcome {
    /// The track that was removed
    pub track: TrackItem,
    /// Whether the removed track was the last live track of its file
    pub file_emptied: bool,
}

/// The live, user-ordered sequence of tracks plus the set of deleted tracks
#[derive(Clone, Debug, Default)]
pub struct SelectionState {
    /// Tracks produced by the latest rebuild
    arena: Vec<TrackItem>,
    /// Live sequence, as indices into `arena`
    order: Vec<usize>,
    /// `unique_key`s deleted by the user during this session
    deleted: HashSet<String>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the live sequence from fresh extraction results
    ///
    /// Deleted tracks are filtered out. Tracks that were already live keep their
    /// relative order, so previous reorders are replayed; tracks seen for the first
    /// time follow in extraction order (file order, then in-file order).
    ///
    /// Returns the names of files that have tracks but none of them survived the
    /// deletion filter. The caller is expected to drop those files.
    pub fn rebuild(&mut self, files: &[FileTracks]) -> Vec<String> {
        #[cfg(feature = "profiling")]
        profiling::scope!("selection::rebuild");

        let previous_rank: HashMap<String, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(rank, &index)| (self.arena[index].unique_key.clone(), rank))
            .collect();

        let mut arena = Vec::new();
        let mut emptied = Vec::new();
        for file in files {
            let before = arena.len();
            arena.extend(
                file.tracks
                    .iter()
                    .map(|track| TrackItem::from_track(track, &file.file_name))
                    .filter(|item| !self.deleted.contains(&item.unique_key)),
            );
            if arena.len() == before && !file.tracks.is_empty() {
                emptied.push(file.file_name.clone());
            }
        }

        let mut order: Vec<usize> = (0..arena.len()).collect();
        order.sort_by_key(|&index| match previous_rank.get(&arena[index].unique_key) {
            Some(&rank) => (0, rank),
            None => (1, index),
        });

        self.arena = arena;
        self.order = order;
        emptied
    }

    /// Move the track `moved_id` to `target_position` in the live sequence
    ///
    /// Positions past the end move the track to the last position.
    pub fn move_track(&mut self, moved_id: &str, target_position: usize) -> Result<()> {
        let from = self
            .position_of(moved_id)
            .ok_or_else(|| KmzError::UnknownTrack(moved_id.to_string()))?;
        let index = self.order.remove(from);
        let target = target_position.min(self.order.len());
        self.order.insert(target, index);
        tracing::debug!("Moved track {} from {} to {}", moved_id, from, target);
        Ok(())
    }

    /// Remove the track `track_id` from the live sequence for the rest of the session
    pub fn delete_track(&mut self, track_id: &str) -> Result<DeleteOutcome> {
        let position = self
            .position_of(track_id)
            .ok_or_else(|| KmzError::UnknownTrack(track_id.to_string()))?;
        let index = self.order.remove(position);
        let track = self.arena[index].clone();
        self.deleted.insert(track.unique_key.clone());

        let file_emptied = !self
            .order
            .iter()
            .any(|&i| self.arena[i].file_index == track.file_index);
        tracing::debug!(
            "Deleted track {} ({}), file emptied: {}",
            track.id,
            track.unique_key,
            file_emptied
        );
        Ok(DeleteOutcome {
            track,
            file_emptied,
        })
    }

    /// Live tracks in their current order
    pub fn live(&self) -> impl Iterator<Item = &TrackItem> {
        self.order.iter().map(|&index| &self.arena[index])
    }

    /// Live tracks belonging to one file, in their current order
    pub fn live_for_file(&self, file_index: usize) -> impl Iterator<Item = &TrackItem> {
        self.live().filter(move |item| item.file_index == file_index)
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.live().map(|item| item.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&TrackItem> {
        self.live().find(|item| item.id == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[inline]
    pub fn is_deleted(&self, unique_key: &str) -> bool {
        self.deleted.contains(unique_key)
    }

    /// Deleted unique keys, sorted for stable output
    pub fn deleted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.deleted.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Forget every track, ordering and deletion
    pub fn clear(&mut self) {
        self.arena.clear();
        self.order.clear();
        self.deleted.clear();
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|&index| self.arena[index].id == id)
    }
}
