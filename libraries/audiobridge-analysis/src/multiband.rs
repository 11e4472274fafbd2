//! Multiband Volume Renderer
//!
//! Splits the spectrum between `min_frequency` and `max_frequency` into
//! `bands` groups and reports a smoothed, normalized magnitude per group.
//!
//! Per analysed frame:
//! 1. Mix channels down to mono
//! 2. Apply a Hann window and run a forward FFT
//! 3. Keep the bins inside the frequency range and average them per band
//! 4. Smooth each band against its history, clamp to [`MIN_MAGNITUDE`, `MAX_MAGNITUDE`]
//!    and rescale to [0, 1]

use crate::level::FrameSkipper;
use audiobridge_core::config::MultibandSettings;
use audiobridge_core::{AudioBuffer, AudioRenderer, BridgeEvent, EventSink};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, trace};

/// Smoothed magnitudes at or below this read as 0
pub const MIN_MAGNITUDE: f32 = 2.0;

/// Smoothed magnitudes at or above this read as 1
pub const MAX_MAGNITUDE: f32 = 25.0;

/// History decay: each band keeps `1 - 1/SMOOTHING` of its previous value
const SMOOTHING: f32 = 5.0;

/// FFT plan and scratch space, rebuilt when the frame size changes
struct Spectrum {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    bins: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Spectrum {
    fn new(planner: &mut FftPlanner<f32>, size: usize) -> Self {
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            size,
            fft,
            window: hann_window(size),
            bins: vec![Complex::new(0.0, 0.0); size],
            scratch,
        }
    }
}

struct AnalysisState {
    skipper: FrameSkipper,
    planner: FftPlanner<f32>,
    spectrum: Option<Spectrum>,
    averages: Vec<f32>,
}

pub struct MultibandVolumeRenderer {
    bands: usize,
    min_frequency: f32,
    max_frequency: f32,
    state: Mutex<AnalysisState>,
    tag: RwLock<Option<String>>,
    sink: Arc<dyn EventSink>,
}

impl MultibandVolumeRenderer {
    pub fn new(settings: &MultibandSettings, sink: Arc<dyn EventSink>) -> Self {
        let bands = settings.bands.max(1);
        Self {
            bands,
            min_frequency: settings.min_frequency,
            max_frequency: settings.max_frequency,
            state: Mutex::new(AnalysisState {
                skipper: FrameSkipper::from_interval_ms(settings.interval_ms),
                planner: FftPlanner::new(),
                spectrum: None,
                averages: vec![0.0; bands],
            }),
            tag: RwLock::new(None),
            sink,
        }
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Set the tag events are reported under; `None` silences the renderer
    pub fn set_tag(&self, tag: Option<String>) {
        *self.tag.write().unwrap_or_else(PoisonError::into_inner) = tag;
    }

    pub fn tag(&self) -> Option<String> {
        self.tag.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Analyse one frame, updating the smoothing history
    ///
    /// Returns `None` when the frame holds no audio or the frequency range
    /// contains no FFT bin.
    fn analyse(&self, state: &mut AnalysisState, buffer: &AudioBuffer) -> Option<Vec<f32>> {
        let frames = buffer.frames();
        let channels = buffer.channels();
        if frames < 2 || channels == 0 {
            return None;
        }

        let AnalysisState {
            planner,
            spectrum,
            averages,
            ..
        } = state;
        if spectrum.as_ref().map_or(true, |s| s.size != frames) {
            debug!(frames, "Planning FFT for new frame size");
            *spectrum = Some(Spectrum::new(planner, frames));
        }
        let spectrum = spectrum.as_mut()?;

        // Mono mixdown straight into the FFT input
        spectrum.bins.fill(Complex::new(0.0, 0.0));
        for channel in 0..channels {
            for (bin, sample) in spectrum.bins.iter_mut().zip(buffer.channel(channel)) {
                bin.re += sample;
            }
        }
        let scale = 1.0 / channels as f32;
        for (bin, w) in spectrum.bins.iter_mut().zip(&spectrum.window) {
            bin.re *= scale * w;
        }
        spectrum
            .fft
            .process_with_scratch(&mut spectrum.bins, &mut spectrum.scratch);

        let sample_rate = buffer.format().sample_rate.as_hz() as f32;
        let nyquist_bins = frames / 2;
        let to_bin = |hz: f32| ((hz * frames as f32 / sample_rate).round().max(0.0) as usize).min(nyquist_bins);
        let lo = to_bin(self.min_frequency);
        let hi = to_bin(self.max_frequency);
        if hi <= lo {
            return None;
        }

        let magnitudes: Vec<f32> = spectrum.bins[lo..hi].iter().map(|c| c.norm()).collect();
        Some(band_levels(&magnitudes, averages))
    }
}

/// Average `magnitudes` into `averages.len()` bands, smooth and normalize
fn band_levels(magnitudes: &[f32], averages: &mut [f32]) -> Vec<f32> {
    let bands = averages.len();
    let len = magnitudes.len() as f32;

    averages
        .iter_mut()
        .enumerate()
        .map(|(band, average)| {
            let start = (len * band as f32 / bands as f32).round() as usize;
            let end = ((len * (band + 1) as f32 / bands as f32).round() as usize).min(magnitudes.len());
            let level = if end > start {
                magnitudes[start..end].iter().sum::<f32>() / (end - start) as f32
            } else {
                0.0
            };

            *average += level - *average / SMOOTHING;
            (average.clamp(MIN_MAGNITUDE, MAX_MAGNITUDE) - MIN_MAGNITUDE) / (MAX_MAGNITUDE - MIN_MAGNITUDE)
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / denom).cos())
        .collect()
}

impl AudioRenderer for MultibandVolumeRenderer {
    fn render(&self, buffer: &AudioBuffer) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.skipper.tick() {
            return;
        }

        let Some(id) = self.tag() else {
            trace!("Multiband renderer has no tag, not analysing");
            return;
        };
        let Some(magnitudes) = self.analyse(&mut state, buffer) else {
            trace!("No spectrum for this frame");
            return;
        };
        drop(state);

        if !magnitudes.is_empty() {
            self.sink.emit(BridgeEvent::MultibandProcessed { id, magnitudes });
        }
    }

    fn name(&self) -> &str {
        "MultibandVolume"
    }
}

impl fmt::Debug for MultibandVolumeRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultibandVolumeRenderer")
            .field("bands", &self.bands)
            .field("min_frequency", &self.min_frequency)
            .field("max_frequency", &self.max_frequency)
            .field("tag", &self.tag())
            .finish_non_exhaustive()
    }
}
