//! Pulse/Package data model and the streaming pulse detector.
//!
//! The detector is a debounce/adaptive-threshold state machine shared by
//! both demodulation paths (same hysteresis/debounce shape for AM and FM),
//! driven by registry-wide gap/reset limits rather than one hardcoded
//! timeout, and emitting `(mark, space)` [`Pulse`] pairs rather than a flat
//! level/duration list.

use crate::sample::Sample;
use num_complex::Complex;

/// Pulses per package before the detector force-closes it and sets `truncated`.
pub const MAX_PULSES: usize = 1200;
/// Maximum total package duration, in microseconds, before a forced close.
pub const MAX_PACKAGE_DURATION_US: u64 = 1_100_000;

/// One (mark, space) duration pair, in microseconds. The final pulse of a
/// package may have `space_us` set to the terminating gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub mark_us: u32,
    pub space_us: u32,
}

/// Which demodulator path produced a [`Package`] — gates which
/// [`crate::registry::DecoderSpec`]s are even attempted against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemodPath {
    Am,
    Fm,
}

/// A finalized, ordered sequence of pulses plus capture metadata.
#[derive(Debug, Clone)]
pub struct Package {
    pub path: DemodPath,
    pub pulses: Vec<Pulse>,
    /// Inclusive pulse indices at which each row ends.
    pub row_ends: Vec<usize>,
    pub sample_rate_hz: u32,
    pub center_frequency_hz: u32,
    pub rssi_db: f32,
    pub noise_db: f32,
    pub snr_db: f32,
    pub freq1_hz: f32,
    pub freq2_hz: f32,
    /// Set when the package was force-terminated by pulse-count overflow
    /// rather than a natural long gap; downstream decoders may still
    /// succeed on the captured prefix.
    pub truncated: bool,
}

impl Package {
    /// Total duration of the package, in samples-equivalent microseconds:
    /// `sum(mark_i + space_i)`.
    pub fn duration_us(&self) -> u64 {
        self.pulses
            .iter()
            .map(|p| p.mark_us as u64 + p.space_us as u64)
            .sum()
    }

    /// Number of rows (including a trailing row with no explicit row-end
    /// marker, i.e. one that ran to package termination).
    pub fn row_count(&self) -> usize {
        if self.pulses.is_empty() {
            0
        } else if self.row_ends.last().copied() == Some(self.pulses.len() - 1) {
            self.row_ends.len()
        } else {
            self.row_ends.len() + 1
        }
    }

    /// Pulses belonging to row `row` (0-indexed).
    pub fn row_pulses(&self, row: usize) -> &[Pulse] {
        let start = if row == 0 {
            0
        } else {
            self.row_ends.get(row - 1).map(|e| e + 1).unwrap_or(self.pulses.len())
        };
        let end = self
            .row_ends
            .get(row)
            .map(|e| e + 1)
            .unwrap_or(self.pulses.len());
        if start >= self.pulses.len() || start > end {
            &[]
        } else {
            &self.pulses[start..end.min(self.pulses.len())]
        }
    }
}

/// Registry-wide limits the pulse detector uses to decide row/package
/// boundaries (computed once by [`crate::registry::DecoderRegistry::program_limits`]).
#[derive(Debug, Clone, Copy)]
pub struct DetectorLimits {
    /// Smallest `gap_limit_us` among active decoders — any gap at or above
    /// this ends the current row.
    pub gap_limit_us: u32,
    /// Largest `reset_limit_us` among active decoders — any gap at or above
    /// this ends the current package. Clamped to the global 1s cap.
    pub reset_limit_us: u32,
}

impl Default for DetectorLimits {
    fn default() -> Self {
        Self {
            gap_limit_us: 10_000,
            reset_limit_us: 87_000,
        }
    }
}

/// Demodulator + pulse detector state machine for one demodulation path.
///
/// Adaptive threshold with hysteresis, magnitude smoothing, debounce on
/// tentative transitions, and transition-based (not per-sample) threshold
/// updates to avoid duty-cycle bias.
pub struct PulseDetector {
    path: DemodPath,
    sample_rate_hz: u32,
    samples_per_us: f64,
    limits: DetectorLimits,

    // ── Active-stream adaptive threshold (AM: envelope, FM: freq Hz) ──
    threshold: f32,
    high_level: f32,
    low_level: f32,
    hysteresis: f32,
    value_smooth: f32,

    // ── FM phase-difference state (always tracked, for freq1/freq2) ──
    prev_iq: Option<Complex<f32>>,
    fm_smooth: f32,
    fm_threshold: f32,
    fm_hysteresis: f32,
    fm_high_sum: f64,
    fm_high_count: u64,
    fm_low_sum: f64,
    fm_low_count: u64,

    // ── Level/duration debounce state machine ──
    current_level: bool,
    level_sample_count: u64,
    level_mag_sum: f64,
    level_mag_count: u64,
    in_transition: bool,
    pending_level: bool,
    pending_count: u64,
    pending_mag_sum: f64,
    samples_since_edge: u64,
    total_samples: u64,
    min_duration_us: u32,

    // ── Pulse/package accumulation ──
    pending_mark_us: Option<u32>,
    pulses: Vec<Pulse>,
    row_ends: Vec<usize>,
    duration_us_acc: u64,
    truncated: bool,
}

impl PulseDetector {
    pub fn new(sample_rate_hz: u32, path: DemodPath, limits: DetectorLimits) -> Self {
        Self {
            path,
            sample_rate_hz,
            samples_per_us: sample_rate_hz as f64 / 1_000_000.0,
            limits,

            threshold: 0.08,
            high_level: 0.15,
            low_level: 0.02,
            hysteresis: 0.02,
            value_smooth: 0.0,

            prev_iq: None,
            fm_smooth: 0.0,
            fm_threshold: 0.0,
            fm_hysteresis: 500.0,
            fm_high_sum: 0.0,
            fm_high_count: 0,
            fm_low_sum: 0.0,
            fm_low_count: 0,

            current_level: false,
            level_sample_count: 0,
            level_mag_sum: 0.0,
            level_mag_count: 0,
            in_transition: false,
            pending_level: false,
            pending_count: 0,
            pending_mag_sum: 0.0,
            samples_since_edge: 0,
            total_samples: 0,
            min_duration_us: 40,

            pending_mark_us: None,
            pulses: Vec::with_capacity(MAX_PULSES),
            row_ends: Vec::new(),
            duration_us_acc: 0,
            truncated: false,
        }
    }

    /// Update registry-derived limits; takes effect immediately (the caller
    /// is expected to apply this only at package boundaries).
    pub fn set_limits(&mut self, limits: DetectorLimits) {
        self.limits = limits;
    }

    /// Process one batch of samples. Returns `Some(Package)` once a long
    /// enough gap (or the overflow caps) closes the current package.
    pub fn process_samples(&mut self, samples: &[Sample]) -> Option<Package> {
        for &sample in samples {
            self.step_fm_histogram(sample);

            let value = match self.path {
                DemodPath::Am => sample.envelope(),
                DemodPath::Fm => self.instantaneous_freq(sample),
            };
            self.value_smooth = self.value_smooth * 0.9 + value * 0.1;

            if self.total_samples < 10_000 {
                self.update_threshold_fast(self.value_smooth);
            }

            let is_high = if self.current_level {
                self.value_smooth > (self.threshold - self.hysteresis)
            } else {
                self.value_smooth > (self.threshold + self.hysteresis)
            };

            self.total_samples += 1;
            let mag_f64 = self.value_smooth as f64;

            if self.in_transition {
                self.step_in_transition(is_high, mag_f64);
            } else if is_high != self.current_level && self.level_sample_count > 0 {
                self.in_transition = true;
                self.pending_level = is_high;
                self.pending_count = 1;
                self.pending_mag_sum = mag_f64;
            } else {
                self.level_sample_count += 1;
                self.level_mag_sum += mag_f64;
                self.level_mag_count += 1;
                self.samples_since_edge += 1;
            }

            if self.pulses.len() >= MAX_PULSES {
                self.truncated = true;
                return self.finalize_package();
            }
            if self.duration_us_acc >= MAX_PACKAGE_DURATION_US {
                self.truncated = true;
                return self.finalize_package();
            }
        }

        let gap_samples = (self.limits.reset_limit_us as f64 * self.samples_per_us) as u64;
        if !self.pulses.is_empty() && self.samples_since_edge > gap_samples {
            self.flush_pending_transition();
            let duration_us = (self.level_sample_count as f64 / self.samples_per_us) as u32;
            self.close_segment(self.current_level, duration_us);
            return self.finalize_package();
        }

        None
    }

    fn step_in_transition(&mut self, is_high: bool, mag_f64: f64) {
        if is_high == self.pending_level {
            self.pending_count += 1;
            self.pending_mag_sum += mag_f64;
            let pending_us = (self.pending_count as f64 / self.samples_per_us) as u32;
            if pending_us >= self.min_duration_us {
                if self.total_samples >= 10_000 && self.level_mag_count > 0 {
                    let avg = (self.level_mag_sum / self.level_mag_count as f64) as f32;
                    self.update_threshold_at_transition(avg, self.current_level);
                }
                let duration_us = (self.level_sample_count as f64 / self.samples_per_us) as u32;
                self.close_segment(self.current_level, duration_us);

                self.samples_since_edge = 0;
                self.current_level = self.pending_level;
                self.level_sample_count = self.pending_count;
                self.level_mag_sum = self.pending_mag_sum;
                self.level_mag_count = self.pending_count;
                self.in_transition = false;
            }
        } else {
            self.level_sample_count += self.pending_count + 1;
            self.level_mag_sum += self.pending_mag_sum + mag_f64;
            self.level_mag_count += self.pending_count + 1;
            self.in_transition = false;
        }
    }

    fn flush_pending_transition(&mut self) {
        if self.in_transition {
            let duration_us = (self.level_sample_count as f64 / self.samples_per_us) as u32;
            self.close_segment(self.current_level, duration_us);
            self.level_sample_count = self.pending_count;
            self.current_level = self.pending_level;
            self.in_transition = false;
        }
    }

    /// A level segment of `duration_us` at `level` has just been confirmed.
    /// Pairs a closing LOW (space) with a previously pending HIGH (mark)
    /// into one [`Pulse`], and records row/package boundaries from the
    /// gap's length.
    fn close_segment(&mut self, level: bool, duration_us: u32) {
        if duration_us < self.min_duration_us {
            return;
        }
        self.duration_us_acc += duration_us as u64;

        if level {
            // A mark just ended — hold it until its gap closes.
            self.pending_mark_us = Some(duration_us);
            return;
        }

        // A space just ended.
        let Some(mark_us) = self.pending_mark_us.take() else {
            return;
        };
        let space_us = duration_us;
        self.pulses.push(Pulse { mark_us, space_us });

        if space_us as u32 >= self.limits.gap_limit_us {
            self.row_ends.push(self.pulses.len() - 1);
        }
    }

    fn finalize_package(&mut self) -> Option<Package> {
        if self.pulses.len() < 2 {
            self.reset_state();
            return None;
        }
        let (freq1_hz, freq2_hz) = self.freq_peaks();
        let pkg = Package {
            path: self.path,
            pulses: std::mem::take(&mut self.pulses),
            row_ends: std::mem::take(&mut self.row_ends),
            sample_rate_hz: self.sample_rate_hz,
            center_frequency_hz: 0,
            rssi_db: 20.0 * (self.high_level.max(1e-6)).log10(),
            noise_db: 20.0 * (self.low_level.max(1e-6)).log10(),
            snr_db: 20.0 * ((self.high_level.max(1e-6)) / (self.low_level.max(1e-6))).log10(),
            freq1_hz,
            freq2_hz,
            truncated: self.truncated,
        };
        self.reset_state();
        Some(pkg)
    }

    fn reset_state(&mut self) {
        self.pulses.clear();
        self.row_ends.clear();
        self.level_sample_count = 0;
        self.level_mag_sum = 0.0;
        self.level_mag_count = 0;
        self.samples_since_edge = 0;
        self.current_level = false;
        self.in_transition = false;
        self.pending_level = false;
        self.pending_count = 0;
        self.pending_mag_sum = 0.0;
        self.pending_mark_us = None;
        self.duration_us_acc = 0;
        self.truncated = false;
        self.fm_high_sum = 0.0;
        self.fm_high_count = 0;
        self.fm_low_sum = 0.0;
        self.fm_low_count = 0;
    }

    fn update_threshold_fast(&mut self, value: f32) {
        let alpha: f32 = 0.01;
        if value > self.threshold {
            self.high_level = self.high_level * (1.0 - alpha) + value * alpha;
        } else {
            self.low_level = self.low_level * (1.0 - alpha) + value * alpha;
        }
        self.recalc_threshold();
    }

    fn update_threshold_at_transition(&mut self, avg_value: f32, was_high: bool) {
        let alpha: f32 = 0.3;
        if was_high {
            self.high_level = self.high_level * (1.0 - alpha) + avg_value * alpha;
        } else {
            self.low_level = self.low_level * (1.0 - alpha) + avg_value * alpha;
        }
        self.recalc_threshold();
    }

    fn recalc_threshold(&mut self) {
        match self.path {
            DemodPath::Am => {
                self.threshold = ((self.low_level + self.high_level) / 2.0).clamp(0.02, 0.5);
                self.hysteresis = ((self.high_level - self.low_level) * 0.10).clamp(0.01, 0.08);
            }
            DemodPath::Fm => {
                // Symmetric 2FSK: threshold stays centered on zero, only the
                // hysteresis half-width adapts to the observed deviation.
                self.threshold = 0.0;
                self.hysteresis = ((self.high_level - self.low_level) * 0.5).max(300.0);
            }
        }
    }

    /// Instantaneous frequency via phase-difference discriminator:
    /// `atan2(I*I'-1 + Q*Q'-1 cross terms)`, scaled to Hz, then EMA smoothed.
    fn instantaneous_freq(&mut self, sample: Sample) -> f32 {
        let Some(c) = sample.as_iq() else { return 0.0 };
        let Some(prev) = self.prev_iq else {
            self.prev_iq = Some(c);
            return 0.0;
        };
        let re = c.re * prev.re + c.im * prev.im;
        let im = c.im * prev.re - c.re * prev.im;
        self.prev_iq = Some(c);
        let phase_diff = im.atan2(re);
        let rad_to_hz = self.sample_rate_hz as f32 / std::f32::consts::TAU;
        phase_diff * rad_to_hz
    }

    /// Track a zero-centered hysteresis classifier over the FM stream
    /// independent of the active path, accumulating high/low bin sums so
    /// `freq1_hz`/`freq2_hz` can be reported even when the active path is
    /// AM (useful when an OOK package still carries FSK sidebands).
    fn step_fm_histogram(&mut self, sample: Sample) {
        let Some(c) = sample.as_iq() else { return };
        // Re-derive the phase diff independently of `instantaneous_freq` so
        // histogram tracking never perturbs the active-path `prev_iq` state
        // when path == Fm (that method already advances `prev_iq`).
        if self.path == DemodPath::Fm {
            // Active path already advanced prev_iq and computed fm value
            // this sample via `instantaneous_freq`; reuse `value_smooth`.
            self.fm_smooth = self.value_smooth;
        } else {
            thread_local_noop(c);
        }
        let is_high = self.fm_smooth > self.fm_threshold + self.fm_hysteresis
            || (self.fm_smooth > self.fm_threshold && self.fm_smooth > self.fm_threshold - self.fm_hysteresis);
        if is_high {
            self.fm_high_sum += self.fm_smooth as f64;
            self.fm_high_count += 1;
        } else {
            self.fm_low_sum += self.fm_smooth as f64;
            self.fm_low_count += 1;
        }
    }

    fn freq_peaks(&self) -> (f32, f32) {
        let freq1 = if self.fm_high_count > 0 {
            (self.fm_high_sum / self.fm_high_count as f64) as f32
        } else {
            0.0
        };
        let freq2 = if self.fm_low_count > 0 {
            (self.fm_low_sum / self.fm_low_count as f64) as f32
        } else {
            0.0
        };
        (freq1, freq2)
    }
}

/// No-op placeholder keeping the histogram path's borrow shape symmetric
/// when the active path is AM (no independent FM sample is computed).
fn thread_local_noop(_c: Complex<f32>) {}
