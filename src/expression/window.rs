//! Rolling window: fixed pre-allocated circular buffer of expression samples.
//! Capacity is set once at construction; the oldest sample is overwritten on
//! overflow.

use super::{ExpressionSample, CATEGORY_COUNT};

/// Fixed-size FIFO of the most recent samples. Never grows.
pub struct RollingWindow {
    buffer: Box<[Option<ExpressionSample>]>,
    write_pos: usize,
    len: usize,
    capacity: usize,
}

impl RollingWindow {
    /// Create a window holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![None; capacity].into_boxed_slice(),
            write_pos: 0,
            len: 0,
            capacity,
        }
    }

    /// Insert a sample. Returns the evicted sample when the window was full.
    pub fn push(&mut self, sample: ExpressionSample) -> Option<ExpressionSample> {
        let evicted = self.buffer[self.write_pos].replace(sample);
        self.write_pos = (self.write_pos + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
        evicted
    }

    /// Iterate buffered samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ExpressionSample> + '_ {
        let start = (self.write_pos + self.capacity - self.len) % self.capacity;
        (0..self.len).filter_map(move |i| self.buffer[(start + i) % self.capacity].as_ref())
    }

    /// Arithmetic mean per category over all buffered samples.
    /// Returns None when the window is empty.
    pub fn means(&self) -> Option<[f32; CATEGORY_COUNT]> {
        if self.len == 0 {
            return None;
        }
        let mut sums = [0.0f64; CATEGORY_COUNT];
        for sample in self.iter() {
            for (sum, &p) in sums.iter_mut().zip(sample.probabilities()) {
                *sum += p as f64;
            }
        }
        let n = self.len as f64;
        Some(sums.map(|s| (s / n) as f32))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every buffered sample.
    pub fn clear(&mut self) {
        for slot in self.buffer.iter_mut() {
            *slot = None;
        }
        self.write_pos = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Emotion;

    fn sample_at(ts: u64, happy: f32) -> ExpressionSample {
        let mut probs = [0.0; CATEGORY_COUNT];
        probs[Emotion::Happy.index()] = happy;
        ExpressionSample::new(ts, probs).unwrap()
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut window = RollingWindow::new(5);
        for i in 0..23 {
            window.push(sample_at(i, 0.5));
            assert!(window.len() <= 5);
        }
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn keeps_only_most_recent_in_order() {
        let mut window = RollingWindow::new(5);
        for i in 0..8 {
            window.push(sample_at(i, 0.1));
        }
        let stamps: Vec<u64> = window.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn push_reports_eviction() {
        let mut window = RollingWindow::new(2);
        assert!(window.push(sample_at(0, 0.1)).is_none());
        assert!(window.push(sample_at(1, 0.1)).is_none());
        let evicted = window.push(sample_at(2, 0.1)).unwrap();
        assert_eq!(evicted.timestamp_ms, 0);
    }

    #[test]
    fn means_follow_eviction() {
        let mut window = RollingWindow::new(2);
        window.push(sample_at(0, 1.0));
        window.push(sample_at(1, 0.0));
        let means = window.means().unwrap();
        assert!((means[Emotion::Happy.index()] - 0.5).abs() < 1e-6);

        window.push(sample_at(2, 0.0));
        let means = window.means().unwrap();
        assert_eq!(means[Emotion::Happy.index()], 0.0);
    }

    #[test]
    fn clear_empties_window() {
        let mut window = RollingWindow::new(3);
        window.push(sample_at(0, 0.2));
        window.clear();
        assert!(window.is_empty());
        assert!(window.means().is_none());
        assert_eq!(window.iter().count(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let window = RollingWindow::new(0);
        assert_eq!(window.capacity(), 1);
    }
}
