//! Per-category dirty tracking across frame slots.
//!
//! Each category carries a version that increases on every mutation, and
//! each slot remembers the last version it observed. A slot is stale for a
//! category when the two differ. The pending count of a category (how many
//! slots still need the update) is therefore always in `[0, N]`; marking a
//! category again while it drains restarts the countdown at `N` without ever
//! exceeding it.
//!
//! # Example
//!
//! ```
//! use inflight_renderer::dirty::{DirtyCategory, DirtyTracker};
//!
//! let mut tracker = DirtyTracker::new(2);
//! for slot in 0..2 {
//!     tracker.decrement(DirtyCategory::Lights, slot);
//! }
//! tracker.mark_dirty(DirtyCategory::Lights);
//! assert_eq!(tracker.pending(DirtyCategory::Lights), 2);
//!
//! assert!(tracker.consume(DirtyCategory::Lights, 0));
//! tracker.decrement(DirtyCategory::Lights, 0);
//! assert_eq!(tracker.pending(DirtyCategory::Lights), 1);
//! assert!(!tracker.consume(DirtyCategory::Lights, 0));
//! ```

use std::fmt;

/// Categories of per-slot state that can go stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirtyCategory {
    /// Camera uniform block.
    Camera,
    /// Primitive transform array.
    Transforms,
    /// Light array.
    Lights,
    /// Texture array descriptors.
    Textures,
    /// Recorded command sequence.
    Commands,
}

impl DirtyCategory {
    /// Every category, in servicing order.
    pub const ALL: [DirtyCategory; 5] = [
        DirtyCategory::Camera,
        DirtyCategory::Transforms,
        DirtyCategory::Lights,
        DirtyCategory::Textures,
        DirtyCategory::Commands,
    ];

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DirtyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DirtyCategory::Camera => "camera",
            DirtyCategory::Transforms => "transforms",
            DirtyCategory::Lights => "lights",
            DirtyCategory::Textures => "textures",
            DirtyCategory::Commands => "commands",
        };
        f.write_str(name)
    }
}

const CATEGORY_COUNT: usize = DirtyCategory::ALL.len();

/// Tracks which slots have observed the latest value of each category.
#[derive(Clone, Debug)]
pub struct DirtyTracker {
    versions: [u64; CATEGORY_COUNT],
    observed: Vec<[u64; CATEGORY_COUNT]>,
}

impl DirtyTracker {
    /// Creates a tracker for `slots` frame slots with every category dirty.
    pub fn new(slots: usize) -> Self {
        Self {
            versions: [1; CATEGORY_COUNT],
            observed: vec![[0; CATEGORY_COUNT]; slots],
        }
    }

    /// Number of slots tracked.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.observed.len()
    }

    /// Makes every slot stale for `category`.
    pub fn mark_dirty(&mut self, category: DirtyCategory) {
        self.versions[category.index()] += 1;
    }

    /// Makes every slot stale for every category.
    pub fn mark_all(&mut self) {
        for category in DirtyCategory::ALL {
            self.mark_dirty(category);
        }
    }

    /// Whether `slot` still has to service `category`.
    pub fn consume(&self, category: DirtyCategory, slot: usize) -> bool {
        let version = self.versions[category.index()];
        self.observed
            .get(slot)
            .is_some_and(|seen| seen[category.index()] != version)
    }

    /// Records that `slot` now holds the latest value of `category`.
    ///
    /// Repeated calls for the same slot are no-ops.
    pub fn decrement(&mut self, category: DirtyCategory, slot: usize) {
        let version = self.versions[category.index()];
        if let Some(seen) = self.observed.get_mut(slot) {
            seen[category.index()] = version;
        }
    }

    /// Makes only `slot` stale for `category`.
    pub fn invalidate(&mut self, category: DirtyCategory, slot: usize) {
        if let Some(seen) = self.observed.get_mut(slot) {
            seen[category.index()] = 0;
        }
    }

    /// Number of slots still stale for `category`.
    pub fn pending(&self, category: DirtyCategory) -> usize {
        (0..self.observed.len())
            .filter(|&slot| self.consume(category, slot))
            .count()
    }

    /// Whether every slot has observed every category.
    pub fn is_clean(&self) -> bool {
        DirtyCategory::ALL
            .iter()
            .all(|&category| self.pending(category) == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained(slots: usize) -> DirtyTracker {
        let mut tracker = DirtyTracker::new(slots);
        for category in DirtyCategory::ALL {
            for slot in 0..slots {
                tracker.decrement(category, slot);
            }
        }
        tracker
    }

    #[test]
    fn test_new_tracker_is_fully_dirty() {
        let tracker = DirtyTracker::new(3);
        for category in DirtyCategory::ALL {
            assert_eq!(tracker.pending(category), 3);
        }
        assert!(!tracker.is_clean());
    }

    #[test]
    fn test_mark_sets_pending_to_slot_count() {
        let mut tracker = drained(3);
        assert!(tracker.is_clean());

        tracker.mark_dirty(DirtyCategory::Camera);
        assert_eq!(tracker.pending(DirtyCategory::Camera), 3);
        assert_eq!(tracker.pending(DirtyCategory::Lights), 0);
    }

    #[test]
    fn test_remark_never_exceeds_slot_count() {
        let mut tracker = drained(2);
        for _ in 0..5 {
            tracker.mark_dirty(DirtyCategory::Transforms);
        }
        assert_eq!(tracker.pending(DirtyCategory::Transforms), 2);
    }

    #[test]
    fn test_remark_during_drain_restarts_countdown() {
        let mut tracker = drained(3);
        tracker.mark_dirty(DirtyCategory::Lights);
        tracker.decrement(DirtyCategory::Lights, 0);
        tracker.decrement(DirtyCategory::Lights, 1);
        assert_eq!(tracker.pending(DirtyCategory::Lights), 1);

        tracker.mark_dirty(DirtyCategory::Lights);
        assert_eq!(tracker.pending(DirtyCategory::Lights), 3);
        assert!(tracker.consume(DirtyCategory::Lights, 0));
    }

    #[test]
    fn test_decrement_is_idempotent() {
        let mut tracker = drained(2);
        tracker.mark_dirty(DirtyCategory::Commands);
        tracker.decrement(DirtyCategory::Commands, 1);
        tracker.decrement(DirtyCategory::Commands, 1);
        assert_eq!(tracker.pending(DirtyCategory::Commands), 1);
        assert!(tracker.consume(DirtyCategory::Commands, 0));
    }

    #[test]
    fn test_invalidate_touches_one_slot() {
        let mut tracker = drained(3);
        tracker.invalidate(DirtyCategory::Commands, 2);

        assert_eq!(tracker.pending(DirtyCategory::Commands), 1);
        assert!(tracker.consume(DirtyCategory::Commands, 2));
        assert!(!tracker.consume(DirtyCategory::Commands, 0));
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let mut tracker = DirtyTracker::new(2);
        tracker.decrement(DirtyCategory::Camera, 9);
        tracker.invalidate(DirtyCategory::Camera, 9);
        assert!(!tracker.consume(DirtyCategory::Camera, 9));
        assert_eq!(tracker.pending(DirtyCategory::Camera), 2);
    }

    #[test]
    fn test_mark_all() {
        let mut tracker = drained(2);
        tracker.mark_all();
        for category in DirtyCategory::ALL {
            assert_eq!(tracker.pending(category), 2);
        }
    }
}
