//! Fixed-capacity pose windows
//!
//! One ring buffer per configured window size, all fed from the same frame
//! stream. A window is ready once it holds exactly `size` samples.

use std::collections::BTreeSet;

use super::types::PoseSample;

/// Ring buffer of the most recent `capacity` pose samples
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    /// Storage is allocated once; after filling, writes overwrite in place
    slots: Vec<PoseSample>,
    capacity: usize,
    /// Index of the oldest sample
    head: usize,
    len: usize,
}

impl WindowBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: PoseSample) {
        if self.capacity == 0 {
            return;
        }

        if self.slots.len() < self.capacity {
            self.slots.push(sample);
            self.len += 1;
            return;
        }

        // Full: overwrite the oldest slot and advance
        self.slots[self.head] = sample;
        self.head = (self.head + 1) % self.capacity;
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the window holds a full `capacity` samples
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.capacity > 0 && self.len == self.capacity
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &PoseSample> {
        (0..self.len).map(move |i| &self.slots[(self.head + i) % self.capacity])
    }

    /// Sample `back` positions before the newest (0 = newest)
    #[must_use]
    pub fn recent(&self, back: usize) -> Option<&PoseSample> {
        if back >= self.len {
            return None;
        }
        let idx = (self.head + self.len - 1 - back) % self.capacity;
        self.slots.get(idx)
    }

    /// Copy the window contents in chronological order
    #[must_use]
    pub fn to_vec(&self) -> Vec<PoseSample> {
        self.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.len = 0;
    }
}

/// Pick `target` samples by uniform index selection over `[0, len - 1]`
///
/// Index `i` maps to `floor(i * (len - 1) / (target - 1))`, so the first and
/// last samples are always kept.
#[must_use]
pub fn resample(samples: &[PoseSample], target: usize) -> Vec<PoseSample> {
    if samples.is_empty() || target == 0 {
        return Vec::new();
    }
    if target == 1 {
        return vec![samples[0]];
    }
    if samples.len() == target {
        return samples.to_vec();
    }

    let last = samples.len() - 1;
    (0..target)
        .map(|i| samples[i * last / (target - 1)])
        .collect()
}

/// All configured window buffers, fed simultaneously
#[derive(Debug, Clone)]
pub struct WindowBufferManager {
    buffers: Vec<WindowBuffer>,
}

impl WindowBufferManager {
    #[must_use]
    pub fn new(sizes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            buffers: sizes.into_iter().map(WindowBuffer::new).collect(),
        }
    }

    /// Append to every buffer; never fails
    pub fn push(&mut self, sample: PoseSample) {
        for buffer in &mut self.buffers {
            buffer.push(sample);
        }
    }

    /// Sizes of the windows that are currently full
    #[must_use]
    pub fn ready_sizes(&self) -> BTreeSet<usize> {
        self.buffers
            .iter()
            .filter(|b| b.is_ready())
            .map(WindowBuffer::capacity)
            .collect()
    }

    #[must_use]
    pub fn get(&self, size: usize) -> Option<&WindowBuffer> {
        self.buffers.iter().find(|b| b.capacity() == size)
    }

    /// Most recently pushed sample
    #[must_use]
    pub fn latest(&self) -> Option<&PoseSample> {
        self.buffers.iter().find_map(|b| b.recent(0))
    }

    /// Whether every buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(WindowBuffer::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowBuffer> {
        self.buffers.iter()
    }

    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }
}
