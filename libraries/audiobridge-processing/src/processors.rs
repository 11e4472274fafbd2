/// Stock processors
///
/// Small building blocks for chains and demos. Both operate on f32 samples
/// and hold their parameter in an atomic so it can change mid-stream without
/// locking the audio thread.
use audiobridge_core::{AudioBuffer, AudioFormat, AudioProcessor, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Multiplies every sample by a linear gain
///
/// # Real-Time Safety
/// - No allocations in `process()`
/// - Gain changes take effect on the next frame
#[derive(Debug)]
pub struct GainProcessor {
    gain_bits: AtomicU32,
    ready: AtomicBool,
}

impl GainProcessor {
    pub fn new(gain: f32) -> Self {
        Self {
            gain_bits: AtomicU32::new(gain.to_bits()),
            ready: AtomicBool::new(false),
        }
    }

    /// Gain from decibels (0 dB = unity)
    pub fn from_db(db: f32) -> Self {
        Self::new(10.0_f32.powf(db / 20.0))
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    /// Whether the processor sits between `initialize` and `release`
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl AudioProcessor for GainProcessor {
    fn initialize(&self, _format: AudioFormat) {
        self.ready.store(true, Ordering::Release);
    }

    fn process(&self, buffer: &mut AudioBuffer) -> Result<()> {
        let gain = self.gain();
        for sample in buffer.samples_mut() {
            *sample *= gain;
        }
        Ok(())
    }

    fn release(&self) {
        self.ready.store(false, Ordering::Release);
    }

    fn name(&self) -> &str {
        "Gain"
    }
}

/// Hard-clips samples to `[-ceiling, ceiling]`
#[derive(Debug)]
pub struct ClipProcessor {
    ceiling_bits: AtomicU32,
}

impl ClipProcessor {
    /// Clip at full scale ([-1, 1])
    pub fn new() -> Self {
        Self::with_ceiling(1.0)
    }

    /// Clip at a custom ceiling; negative values are treated as their magnitude
    pub fn with_ceiling(ceiling: f32) -> Self {
        Self {
            ceiling_bits: AtomicU32::new(ceiling.abs().to_bits()),
        }
    }

    pub fn ceiling(&self) -> f32 {
        f32::from_bits(self.ceiling_bits.load(Ordering::Relaxed))
    }
}

impl Default for ClipProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessor for ClipProcessor {
    fn initialize(&self, _format: AudioFormat) {}

    fn process(&self, buffer: &mut AudioBuffer) -> Result<()> {
        let ceiling = self.ceiling();
        for sample in buffer.samples_mut() {
            *sample = sample.clamp(-ceiling, ceiling);
        }
        Ok(())
    }

    fn release(&self) {}

    fn name(&self) -> &str {
        "Clip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiobridge_core::SampleRate;

    fn frame(values: &[f32]) -> AudioBuffer {
        AudioBuffer::new(values.to_vec(), AudioFormat::new(SampleRate::FULLBAND, 1))
    }

    #[test]
    fn gain_scales_samples() {
        let gain = GainProcessor::new(2.0);
        let mut buffer = frame(&[0.25, -0.5]);
        gain.process(&mut buffer).unwrap();
        assert_eq!(buffer.samples(), &[0.5, -1.0]);

        gain.set_gain(0.5);
        gain.process(&mut buffer).unwrap();
        assert_eq!(buffer.samples(), &[0.25, -0.5]);
    }

    #[test]
    fn gain_from_db() {
        assert!((GainProcessor::from_db(0.0).gain() - 1.0).abs() < 1e-6);
        assert!((GainProcessor::from_db(-6.0).gain() - 0.501).abs() < 1e-3);
    }

    #[test]
    fn gain_tracks_lifecycle() {
        let gain = GainProcessor::new(1.0);
        assert!(!gain.is_ready());
        gain.initialize(AudioFormat::voice());
        assert!(gain.is_ready());
        gain.release();
        assert!(!gain.is_ready());
    }

    #[test]
    fn clip_limits_both_polarities() {
        let clip = ClipProcessor::new();
        let mut buffer = frame(&[1.8, -3.0, 0.4]);
        clip.process(&mut buffer).unwrap();
        assert_eq!(buffer.samples(), &[1.0, -1.0, 0.4]);

        let soft = ClipProcessor::with_ceiling(-0.5);
        assert_eq!(soft.ceiling(), 0.5);
    }
}
