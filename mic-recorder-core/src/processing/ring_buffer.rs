/// Fixed-capacity circular buffer between a device callback and the thread
/// that reads chunks.
///
/// Wrap in `Arc<parking_lot::Mutex<RingBuffer>>` for cross-thread access.
///
/// Overflow behavior: drops oldest samples and counts them, so a reader that
/// fell behind can report the gap.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    write_index: usize,
    read_index: usize,
    available: usize,
    dropped: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_index: 0,
            read_index: 0,
            available: 0,
            dropped: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Write samples, dropping the oldest on overflow.
    pub fn write(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let capacity = self.capacity();

        let samples = if samples.len() > capacity {
            self.dropped += (samples.len() - capacity) as u64;
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let overflow = (self.available + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % capacity;
            self.available -= overflow;
            self.dropped += overflow as u64;
        }

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % capacity;
        }
        self.available += samples.len();
    }

    /// Move up to `max` samples onto the end of `out`. Returns how many moved.
    pub fn read_into(&mut self, out: &mut Vec<f32>, max: usize) -> usize {
        let to_read = max.min(self.available);
        let capacity = self.capacity();
        out.reserve(to_read);
        for i in 0..to_read {
            out.push(self.buffer[(self.read_index + i) % capacity]);
        }
        self.read_index = (self.read_index + to_read) % capacity;
        self.available -= to_read;
        to_read
    }

    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Samples lost to overflow since the last call.
    pub fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }

    pub fn clear(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }
}
