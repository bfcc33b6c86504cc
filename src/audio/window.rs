//! # Chunk Window
//!
//! Per-connection accumulator for raw PCM16 chunks. Individual chunks are too
//! short to be useful transcription units, so chunks are collected until a
//! flush threshold is reached and then drained as one contiguous window.
//!
//! ## Key Features:
//! - **Ordered**: Chunks are concatenated strictly in arrival order
//! - **Atomic drain**: Draining hands back every buffered byte and leaves the
//!   window empty in one step, so a chunk is never processed twice or lost
//! - **Single owner**: The window is owned by one connection session and is
//!   never shared, so no locking is needed

use crate::audio::SAMPLE_RATE;

/// Default number of chunks that make up one window.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 20;

#[derive(Debug)]
pub struct ChunkWindow {
    /// Raw chunk payloads, oldest first
    chunks: Vec<Vec<u8>>,

    /// Chunk count at which the window is considered full
    threshold: usize,

    /// Sample rate of the PCM carried in the chunks
    sample_rate: u32,

    /// Running byte total so draining can allocate once
    buffered_bytes: usize,
}

impl ChunkWindow {
    /// Create an empty window that reports full after `threshold` chunks.
    ///
    /// A threshold of 0 is treated as 1 so an empty window is never "full".
    pub fn new(threshold: usize) -> Self {
        Self {
            chunks: Vec::with_capacity(threshold.max(1)),
            threshold: threshold.max(1),
            sample_rate: SAMPLE_RATE,
            buffered_bytes: 0,
        }
    }

    /// Append a chunk to the tail of the window.
    pub fn append(&mut self, chunk: Vec<u8>) {
        self.buffered_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    /// True once the buffered chunk count reaches the threshold.
    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.threshold
    }

    /// Concatenate every buffered chunk in arrival order and reset to empty.
    ///
    /// ## Rust Concepts:
    /// - **std::mem::take**: Moves the chunk list out and leaves an empty Vec behind,
    ///   so the drained data and the reset happen in the same `&mut self` borrow
    pub fn drain_all(&mut self) -> Vec<u8> {
        let chunks = std::mem::take(&mut self.chunks);
        let mut window = Vec::with_capacity(self.buffered_bytes);
        self.buffered_bytes = 0;

        for chunk in chunks {
            window.extend_from_slice(&chunk);
        }
        window
    }

    /// Number of chunks currently buffered.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of the buffered audio in seconds (PCM16 mono).
    pub fn duration_seconds(&self) -> f64 {
        (self.buffered_bytes / 2) as f64 / self.sample_rate as f64
    }
}

impl Default for ChunkWindow {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_chunks_in_order() {
        let mut window = ChunkWindow::new(3);
        window.append(vec![1, 2]);
        window.append(vec![3]);
        window.append(vec![4, 5, 6]);

        assert_eq!(window.buffered_bytes(), 6);
        assert_eq!(window.drain_all(), vec![1, 2, 3, 4, 5, 6]);

        // Second drain with nothing appended in between is empty
        assert!(window.drain_all().is_empty());
        assert!(window.is_empty());
        assert_eq!(window.buffered_bytes(), 0);
    }

    #[test]
    fn test_full_at_threshold() {
        let mut window = ChunkWindow::new(2);
        assert!(!window.is_full());

        window.append(vec![0; 4]);
        assert!(!window.is_full());

        window.append(vec![0; 4]);
        assert!(window.is_full());

        window.append(vec![0; 4]);
        assert!(window.is_full());

        window.drain_all();
        assert!(!window.is_full());
    }

    #[test]
    fn test_appends_after_drain_start_a_new_window() {
        let mut window = ChunkWindow::new(1);
        window.append(vec![9]);
        let first = window.drain_all();
        window.append(vec![7]);

        assert_eq!(first, vec![9]);
        assert_eq!(window.drain_all(), vec![7]);
    }

    #[test]
    fn test_duration_and_defaults() {
        let mut window = ChunkWindow::default();
        assert_eq!(window.threshold(), DEFAULT_FLUSH_THRESHOLD);
        assert_eq!(window.sample_rate(), 16000);

        // 320 bytes = 160 samples = 10ms at 16kHz
        window.append(vec![0; 320]);
        assert!((window.duration_seconds() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let window = ChunkWindow::new(0);
        assert_eq!(window.threshold(), 1);
        assert!(!window.is_full());
    }
}
