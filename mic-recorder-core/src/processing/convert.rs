//! Conversions from whatever a device delivers to the configured stream format.
//!
//! Devices hand audio over in arbitrarily sized callback buffers, so the
//! resampler keeps its read position and the previous buffer's last sample
//! between calls. Feeding one long buffer or many short ones yields the same
//! output.

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Duplicate mono samples into `channels` interleaved channels.
pub fn upmix_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len() * channels);
    for &sample in samples {
        out.extend(std::iter::repeat(sample).take(channels));
    }
    out
}

/// Streaming linear interpolation resampler for mono audio.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Source samples advanced per output sample.
    step: f64,
    passthrough: bool,
    /// Read position of the next output sample. Index 0 is `last` when set.
    position: f64,
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(source_rate: f64, target_rate: f64) -> Self {
        let passthrough =
            (source_rate - target_rate).abs() < 0.01 || source_rate <= 0.0 || target_rate <= 0.0;
        let step = if passthrough {
            1.0
        } else {
            source_rate / target_rate
        };
        Self {
            step,
            passthrough,
            position: 0.0,
            last: None,
        }
    }

    /// Resample the next piece of the stream.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.passthrough {
            return samples.to_vec();
        }
        if samples.is_empty() {
            return Vec::new();
        }

        let carried = self.last;
        let offset = usize::from(carried.is_some());
        let len = samples.len() + offset;
        let at = |i: usize| match carried {
            Some(last) if i == 0 => last,
            _ => samples[i - offset],
        };

        let mut out = Vec::with_capacity((samples.len() as f64 / self.step) as usize + 1);
        loop {
            let index = self.position as usize;
            if index + 1 >= len {
                break;
            }
            let fraction = (self.position - index as f64) as f32;
            out.push(at(index) * (1.0 - fraction) + at(index + 1) * fraction);
            self.position += self.step;
        }

        // The final sample becomes index 0 of the next call.
        self.position -= (len - 1) as f64;
        self.last = Some(at(len - 1));
        out
    }
}

/// Per-stream converter to `target_channels` at `target_rate`.
#[derive(Debug, Clone)]
pub struct StreamConverter {
    source_channels: usize,
    target_channels: usize,
    resampler: LinearResampler,
}

impl StreamConverter {
    pub fn new(
        source_channels: usize,
        source_rate: f64,
        target_channels: usize,
        target_rate: f64,
    ) -> Self {
        Self {
            source_channels,
            target_channels,
            resampler: LinearResampler::new(source_rate, target_rate),
        }
    }

    /// Convert the next device buffer.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let mono = downmix_to_mono(samples, self.source_channels);
        let resampled = self.resampler.process(&mono);
        upmix_mono(&resampled, self.target_channels)
    }
}
