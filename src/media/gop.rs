//! GOP (Group of Pictures) cache for late-joining players
//!
//! Holds every audio and video message since the last video keyframe,
//! already serialized as RTMP chunks. A new player receives the cached
//! sequence headers and then these entries, so it can start decoding at
//! once instead of waiting for the next keyframe.
//!
//! Entries are stored with the publisher's message stream id; callers patch
//! it per player before sending.

use bytes::Bytes;
use std::collections::VecDeque;

/// Default byte cap for one GOP (4MB)
pub const DEFAULT_GOP_MAX_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct GopCache {
    max_size: usize,
    current_size: usize,
    entries: VecDeque<Bytes>,
    /// False after an overflow until the next keyframe restarts the GOP
    valid: bool,
}

impl GopCache {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_GOP_MAX_SIZE)
    }

    /// A cap of zero means unbounded
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            current_size: 0,
            entries: VecDeque::new(),
            valid: true,
        }
    }

    /// Start a new GOP at a keyframe
    pub fn restart(&mut self) {
        self.entries.clear();
        self.current_size = 0;
        self.valid = true;
    }

    /// Append serialized chunks
    ///
    /// Returns false when the entry was not cached. An entry that would push
    /// the cache past its cap empties it; nothing more is cached until
    /// [`GopCache::restart`].
    pub fn push(&mut self, chunks: Bytes) -> bool {
        if !self.valid {
            return false;
        }
        let size = chunks.len();
        if self.max_size > 0 && self.current_size + size > self.max_size {
            self.entries.clear();
            self.current_size = 0;
            self.valid = false;
            return false;
        }
        self.current_size += size;
        self.entries.push_back(chunks);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_size = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently cached
    pub fn size(&self) -> usize {
        self.current_size
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for GopCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(len: usize, fill: u8) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    #[test]
    fn test_gop_cache_basic() {
        let mut gop = GopCache::new();
        assert!(gop.is_empty());

        assert!(gop.push(entry(10, 1)));
        assert!(gop.push(entry(20, 2)));
        assert_eq!(gop.len(), 2);
        assert_eq!(gop.size(), 30);

        let fills: Vec<u8> = gop.iter().map(|b| b[0]).collect();
        assert_eq!(fills, vec![1, 2]);
    }

    #[test]
    fn test_gop_cache_restart_on_keyframe() {
        let mut gop = GopCache::new();
        gop.push(entry(10, 1));
        gop.push(entry(10, 2));

        gop.restart();
        gop.push(entry(10, 3));

        assert_eq!(gop.len(), 1);
        assert_eq!(gop.iter().next().unwrap()[0], 3);
    }

    #[test]
    fn test_gop_cache_overflow_invalidates_until_restart() {
        let mut gop = GopCache::with_max_size(25);
        assert!(gop.push(entry(10, 1)));
        assert!(gop.push(entry(10, 2)));
        assert!(!gop.push(entry(10, 3)));
        assert!(gop.is_empty());
        assert!(!gop.is_valid());

        // Partial GOPs are useless to a decoder
        assert!(!gop.push(entry(1, 4)));
        assert!(gop.is_empty());

        gop.restart();
        assert!(gop.push(entry(10, 5)));
        assert_eq!(gop.size(), 10);
    }

    #[test]
    fn test_gop_cache_unbounded() {
        let mut gop = GopCache::with_max_size(0);
        for i in 0..100 {
            assert!(gop.push(entry(1024, i)));
        }
        assert_eq!(gop.len(), 100);
    }

    #[test]
    fn test_gop_cache_clear_keeps_validity() {
        let mut gop = GopCache::default();
        gop.push(entry(5, 1));
        gop.clear();
        assert!(gop.is_empty());
        assert_eq!(gop.size(), 0);
        assert!(gop.push(entry(5, 2)));
    }
}
