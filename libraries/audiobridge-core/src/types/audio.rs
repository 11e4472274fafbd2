//! Audio-related types
use serde::{Deserialize, Serialize};

/// Sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRate(pub u32);

impl SampleRate {
    /// 8 kHz narrowband telephony
    pub const NARROWBAND: Self = Self(8_000);
    /// 16 kHz wideband voice
    pub const WIDEBAND: Self = Self(16_000);
    /// 32 kHz super-wideband voice
    pub const SUPER_WIDEBAND: Self = Self(32_000);
    /// 44.1 kHz
    pub const CD_QUALITY: Self = Self(44_100);
    /// 48 kHz, the usual RTC engine rate
    pub const FULLBAND: Self = Self(48_000);

    /// Create a new sample rate
    #[must_use]
    pub fn new(hz: u32) -> Self {
        Self(hz)
    }

    /// Get the sample rate as Hz
    pub fn as_hz(&self) -> u32 {
        self.0
    }

    /// Number of frames in one 10 ms chunk, the unit the SDK delivers
    pub fn frames_per_10ms(&self) -> usize {
        (self.0 / 100) as usize
    }
}

/// How channels are arranged inside the sample slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLayout {
    /// `[L, R, L, R, ...]`
    #[default]
    Interleaved,
    /// `[L, L, ..., R, R, ...]`, one contiguous block per channel
    Planar,
}

/// Audio format information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate
    pub sample_rate: SampleRate,

    /// Number of channels (1 = mono, 2 = stereo, etc.)
    pub channels: u16,

    /// Channel arrangement
    #[serde(default)]
    pub layout: SampleLayout,
}

impl AudioFormat {
    /// Create a new interleaved audio format
    pub fn new(sample_rate: SampleRate, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            layout: SampleLayout::Interleaved,
        }
    }

    /// Create a planar audio format
    pub fn planar(sample_rate: SampleRate, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            layout: SampleLayout::Planar,
        }
    }

    /// 48 kHz mono, the SDK's default capture format
    pub fn voice() -> Self {
        Self::new(SampleRate::FULLBAND, 1)
    }

    /// Same channels and layout at a different rate
    #[must_use]
    pub fn with_sample_rate(self, sample_rate: SampleRate) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }

    /// A format the pipeline can work with (non-zero rate and channels)
    pub fn is_valid(&self) -> bool {
        self.sample_rate.as_hz() > 0 && self.channels > 0
    }
}

/// One frame of audio flowing through the pipeline
///
/// Samples are f32, nominally in [-1.0, 1.0]. The sample count and format
/// are fixed once the buffer is built: processors get mutable access to the
/// samples but cannot resize them or change the format, so every listener in
/// one dispatch sees a buffer of the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    format: AudioFormat,
}

impl AudioBuffer {
    /// Create a new audio buffer
    ///
    /// Trailing samples that do not make up a whole frame are dropped.
    pub fn new(mut samples: Vec<f32>, format: AudioFormat) -> Self {
        let channels = usize::from(format.channels.max(1));
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self { samples, format }
    }

    /// A buffer of `frames` frames filled with silence
    pub fn silent(frames: usize, format: AudioFormat) -> Self {
        Self::filled(frames, format, 0.0)
    }

    /// A buffer of `frames` frames where every sample is `value`
    pub fn filled(frames: usize, format: AudioFormat, value: f32) -> Self {
        let len = frames * usize::from(format.channels.max(1));
        Self {
            samples: vec![value; len],
            format,
        }
    }

    /// Audio format of this buffer
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// All samples in the buffer's layout
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable access to the samples (length is fixed)
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        usize::from(self.format.channels)
    }

    /// Get the number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.format.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels()
        }
    }

    /// Get the duration in seconds
    pub fn duration_secs(&self) -> f64 {
        let rate = self.format.sample_rate.as_hz();
        if rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(rate)
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the length in samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Iterate the samples of one channel regardless of layout
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        let channels = self.channels().max(1);
        let frames = self.frames();
        let (start, step, count) = if index >= self.channels() {
            (0, 1, 0)
        } else {
            match self.format.layout {
                SampleLayout::Interleaved => (index, channels, frames),
                SampleLayout::Planar => (index * frames, 1, frames),
            }
        };
        self.samples.iter().skip(start).step_by(step).take(count).copied()
    }

    /// Consume the buffer and return its samples
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}
