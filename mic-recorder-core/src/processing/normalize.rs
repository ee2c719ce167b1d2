//! Peak-normalization of a finished segment into 16-bit PCM.
//!
//! The loudest sample is scaled to `headroom` of full scale, which maximizes
//! loudness without clipping. Silence (peak of zero) passes through
//! unscaled.

pub const FULL_SCALE: f32 = i16::MAX as f32;

/// Peak absolute amplitude (0.0 for empty input).
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| {
        let abs = s.abs();
        if abs > peak && abs.is_finite() {
            abs
        } else {
            peak
        }
    })
}

/// Scale factor that maps `peak` to `headroom * FULL_SCALE`, or `None` for silence.
pub fn scale_factor(peak: f32, headroom: f32) -> Option<f32> {
    if peak > 0.0 {
        Some(headroom * FULL_SCALE / peak)
    } else {
        None
    }
}

/// Normalize f32 samples to 16-bit PCM.
///
/// Non-finite samples are treated as silence.
pub fn normalize_to_pcm16(samples: &[f32], headroom: f32) -> Vec<i16> {
    let peak = peak_level(samples);
    let factor = scale_factor(peak, headroom).unwrap_or(FULL_SCALE);

    samples
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                return 0;
            }
            (s * factor).round().clamp(-FULL_SCALE, FULL_SCALE) as i16
        })
        .collect()
}
