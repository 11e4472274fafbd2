/// Level helpers shared by the renderers
use audiobridge_core::config::frames_per_interval;

/// Calculate RMS (Root Mean Square) level
///
/// Returns 0.0 for an empty input.
pub fn calculate_rms(samples: impl IntoIterator<Item = f32>) -> f32 {
    let (sum_squares, count) = samples
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, n), s| (sum + f64::from(s) * f64::from(s), n + 1));

    if count == 0 {
        return 0.0;
    }
    (sum_squares / count as f64).sqrt() as f32
}

/// Calculate peak level
///
/// Returns the absolute maximum sample value.
pub fn calculate_peak(samples: impl IntoIterator<Item = f32>) -> f32 {
    samples.into_iter().map(f32::abs).fold(0.0f32, f32::max)
}

/// Lets one frame out of every `interval` through
///
/// The first frame after construction or [`reset`](Self::reset) is skipped
/// `interval - 1` times before one is let through.
#[derive(Debug, Clone)]
pub struct FrameSkipper {
    interval: usize,
    skipped: usize,
}

impl FrameSkipper {
    /// Skipper for a reporting interval expressed in milliseconds of 10 ms frames
    pub fn from_interval_ms(interval_ms: f64) -> Self {
        Self::new(frames_per_interval(interval_ms))
    }

    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            skipped: 0,
        }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Count one frame; `true` when this frame should be analysed
    pub fn tick(&mut self) -> bool {
        if self.skipped + 1 < self.interval {
            self.skipped += 1;
            return false;
        }
        self.skipped = 0;
        true
    }

    pub fn reset(&mut self) {
        self.skipped = 0;
    }
}
