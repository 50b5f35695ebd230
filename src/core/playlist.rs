//! Playlist order and cursor - single source for next/previous/random targets.
//!
//! Index arithmetic always wraps, so no returned index is ever outside
//! `0..len`. The cursor is `None` before the first track is chosen (the
//! pre-play sentinel, reported as `-1` by `cursor_raw`).
//!
//! Whether a wrap is *allowed* (loop/autoplay policy) is the coordinator's
//! decision; this type only does the arithmetic.

use indexmap::IndexSet;
use log::debug;

use super::clip::TrackId;
use super::decoder::RandomSource;
use super::error::PlayerError;

/// Ordered, unique track list plus cursor.
#[derive(Debug, Clone)]
pub struct PlaylistIndex {
    tracks: IndexSet<TrackId>,
    cursor: Option<usize>,
}

impl PlaylistIndex {
    /// Build from identifiers in play order.
    ///
    /// Rejects empty and duplicate identifiers. An empty list is accepted:
    /// navigation on it fails per call with `EmptyPlaylist`.
    pub fn new<I>(ids: I) -> Result<Self, PlayerError>
    where
        I: IntoIterator,
        I::Item: Into<TrackId>,
    {
        let mut tracks = IndexSet::new();
        for id in ids {
            let id = id.into();
            if id.is_empty() {
                return Err(PlayerError::InvalidTrack);
            }
            if !tracks.insert(id.clone()) {
                return Err(PlayerError::DuplicateTrack(id));
            }
        }
        debug!("PlaylistIndex created: {} tracks", tracks.len());
        Ok(Self { tracks, cursor: None })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackId> {
        self.tracks.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&TrackId> {
        self.tracks.get_index(idx)
    }

    pub fn position(&self, id: &TrackId) -> Option<usize> {
        self.tracks.get_index_of(id)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Cursor in the `[-1, len-1]` convention
    pub fn cursor_raw(&self) -> isize {
        self.cursor.map(|c| c as isize).unwrap_or(-1)
    }

    /// Track under the cursor, if one was chosen.
    pub fn current(&self) -> Option<&TrackId> {
        self.cursor.and_then(|c| self.get(c))
    }

    /// Move the cursor. Out-of-range positions are refused.
    pub fn set_cursor(&mut self, cursor: Option<usize>) -> Result<(), PlayerError> {
        if let Some(idx) = cursor {
            if idx >= self.len() {
                return Err(if self.is_empty() {
                    PlayerError::EmptyPlaylist
                } else {
                    PlayerError::UnknownTrack(TrackId::new(format!("#{}", idx)))
                });
            }
        }
        self.cursor = cursor;
        Ok(())
    }

    /// `(current + 1) mod len`. From the sentinel this is the first track.
    pub fn next_index(&self, current: Option<usize>) -> Result<usize, PlayerError> {
        let len = self.non_empty_len()?;
        Ok(match current {
            Some(c) => (c % len + 1) % len,
            None => 0,
        })
    }

    /// `(current - 1 + len) mod len`. From the sentinel this is the last track.
    pub fn previous_index(&self, current: Option<usize>) -> Result<usize, PlayerError> {
        let len = self.non_empty_len()?;
        Ok(match current {
            Some(c) => (c % len + len - 1) % len,
            None => len - 1,
        })
    }

    /// Uniform index different from `excluding` whenever `len > 1`.
    ///
    /// With a single track this returns that track again: shuffle on a
    /// one-element playlist replays it.
    pub fn random_index(
        &self,
        excluding: Option<usize>,
        rng: &mut dyn RandomSource,
    ) -> Result<usize, PlayerError> {
        let len = self.non_empty_len()?;
        if len == 1 {
            return Ok(0);
        }
        let idx = match excluding {
            Some(c) if c < len => {
                // Sample from len-1 slots and skip over the excluded one
                let k = rng.uniform_index(len - 1).min(len - 2);
                if k >= c { k + 1 } else { k }
            }
            _ => rng.uniform_index(len).min(len - 1),
        };
        Ok(idx)
    }

    fn non_empty_len(&self) -> Result<usize, PlayerError> {
        match self.len() {
            0 => Err(PlayerError::EmptyPlaylist),
            n => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<usize>);

    impl RandomSource for Scripted {
        fn uniform_index(&mut self, n: usize) -> usize {
            self.0.pop_front().unwrap_or(0) % n
        }
    }

    fn abc() -> PlaylistIndex {
        PlaylistIndex::new(["a", "b", "c"]).unwrap()
    }

    #[test]
    fn test_rejects_bad_ids() {
        assert_eq!(
            PlaylistIndex::new(["a", "a"]).unwrap_err(),
            PlayerError::DuplicateTrack(TrackId::from("a"))
        );
        assert_eq!(PlaylistIndex::new(["a", ""]).unwrap_err(), PlayerError::InvalidTrack);
    }

    #[test]
    fn test_empty_playlist_fails_per_call() {
        let p = PlaylistIndex::new(Vec::<TrackId>::new()).unwrap();
        let mut rng = Scripted(VecDeque::new());
        assert_eq!(p.next_index(None), Err(PlayerError::EmptyPlaylist));
        assert_eq!(p.previous_index(Some(0)), Err(PlayerError::EmptyPlaylist));
        assert_eq!(p.random_index(None, &mut rng), Err(PlayerError::EmptyPlaylist));
    }

    #[test]
    fn test_wraparound_and_inverse() {
        let p = abc();
        for start in 0..p.len() {
            let mut idx = start;
            for _ in 0..p.len() {
                idx = p.next_index(Some(idx)).unwrap();
            }
            assert_eq!(idx, start);

            let fwd = p.next_index(Some(start)).unwrap();
            assert_eq!(p.previous_index(Some(fwd)).unwrap(), start);
        }
        assert_eq!(p.next_index(Some(2)).unwrap(), 0);
        assert_eq!(p.previous_index(Some(0)).unwrap(), 2);
    }

    #[test]
    fn test_sentinel_targets() {
        let p = abc();
        assert_eq!(p.cursor_raw(), -1);
        assert_eq!(p.next_index(None).unwrap(), 0);
        assert_eq!(p.previous_index(None).unwrap(), 2);
    }

    #[test]
    fn test_random_excludes_current() {
        let p = abc();
        // Every raw sample must map away from the excluded index
        for raw in 0..2 {
            for current in 0..3 {
                let mut rng = Scripted(VecDeque::from([raw]));
                let idx = p.random_index(Some(current), &mut rng).unwrap();
                assert_ne!(idx, current);
                assert!(idx < 3);
            }
        }
    }

    #[test]
    fn test_random_single_element_replays() {
        let p = PlaylistIndex::new(["only"]).unwrap();
        let mut rng = Scripted(VecDeque::from([5]));
        assert_eq!(p.random_index(Some(0), &mut rng).unwrap(), 0);
        assert_eq!(p.random_index(None, &mut rng).unwrap(), 0);
    }

    #[test]
    fn test_set_cursor_bounds() {
        let mut p = abc();
        assert!(p.set_cursor(Some(3)).is_err());
        p.set_cursor(Some(1)).unwrap();
        assert_eq!(p.current(), Some(&TrackId::from("b")));
        assert_eq!(p.position(&TrackId::from("c")), Some(2));
        p.set_cursor(None).unwrap();
        assert_eq!(p.cursor_raw(), -1);
    }
}
