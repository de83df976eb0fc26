//! Turns a [`Package`]'s pulses into a [`BitMatrix`], one decoded row per
//! package row, according to a [`Modulation`].
//!
//! Every variant shares one rule: a pulse that matches neither of a
//! modulation's expected widths is noise. [`MAX_CONSECUTIVE_NOISE_PULSES`]
//! consecutive noise pulses forcibly end the row being built, leaving
//! whatever bits were already decoded in place (a short, usable row beats a
//! row corrupted by trailing garbage).

use crate::bitmatrix::BitMatrix;
use crate::modulation::{Modulation, MAX_CONSECUTIVE_NOISE_PULSES};
use crate::pulse::{Package, Pulse};

/// Slices a [`Package`] into bit rows for one [`Modulation`].
pub trait Slicer {
    fn slice(&self, package: &Package, modulation: &Modulation) -> BitMatrix;
}

/// The single [`Slicer`] implementation, dispatching on [`Modulation`]
/// variant internally — callers never need one slicer instance per
/// modulation, since the variant itself carries all the needed parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct PulseSlicer;

impl Slicer for PulseSlicer {
    fn slice(&self, package: &Package, modulation: &Modulation) -> BitMatrix {
        let mut matrix = BitMatrix::new();
        let row_count = package.row_count().min(crate::bitmatrix::N_ROWS);
        for row in 0..row_count {
            let pulses = package.row_pulses(row);
            match *modulation {
                Modulation::OokPpm { .. } => slice_ppm(&mut matrix, row, pulses, modulation),
                Modulation::OokPwm { .. } => slice_pwm(&mut matrix, row, pulses, modulation),
                Modulation::Pcm { inverted, .. } => slice_pcm(&mut matrix, row, pulses, modulation, inverted),
                Modulation::ManchesterZeroBit { half_bit_width_us, .. } => {
                    slice_manchester(&mut matrix, row, pulses, half_bit_width_us, modulation, false)
                }
                Modulation::DifferentialManchester { half_bit_width_us, .. } => {
                    slice_manchester(&mut matrix, row, pulses, half_bit_width_us, modulation, true)
                }
                Modulation::OokPwmSpe { sync_width_us, .. } => {
                    slice_pwm_spe(&mut matrix, row, pulses, modulation, sync_width_us)
                }
            }
        }
        matrix
    }
}

/// PPM: fixed mark width, bit carried by gap width.
fn slice_ppm(matrix: &mut BitMatrix, row: usize, pulses: &[Pulse], m: &Modulation) {
    let Modulation::OokPpm {
        short_width_us,
        long_width_us,
        ..
    } = *m
    else {
        return;
    };
    let mut noise_run = 0u32;
    for p in pulses {
        if m.matches(p.space_us, short_width_us) {
            let _ = matrix.add_bit(row, false);
            noise_run = 0;
        } else if m.matches(p.space_us, long_width_us) {
            let _ = matrix.add_bit(row, true);
            noise_run = 0;
        } else {
            noise_run += 1;
            if noise_run >= MAX_CONSECUTIVE_NOISE_PULSES {
                break;
            }
        }
    }
}

/// PWM: fixed period, bit carried by mark width. Short mark = 0, long mark = 1.
fn slice_pwm(matrix: &mut BitMatrix, row: usize, pulses: &[Pulse], m: &Modulation) {
    let Modulation::OokPwm {
        short_width_us,
        long_width_us,
        ..
    } = *m
    else {
        return;
    };
    let mut noise_run = 0u32;
    for p in pulses {
        if m.matches(p.mark_us, short_width_us) {
            let _ = matrix.add_bit(row, false);
            noise_run = 0;
        } else if m.matches(p.mark_us, long_width_us) {
            let _ = matrix.add_bit(row, true);
            noise_run = 0;
        } else {
            noise_run += 1;
            if noise_run >= MAX_CONSECUTIVE_NOISE_PULSES {
                break;
            }
        }
    }
}

/// PWM-SPE ("special", sync pulse encoding): a leading sync pulse is
/// consumed, then raw bits are read from *gap* widths (short gap = 0, long
/// gap = 1, unlike plain PWM which reads the mark) two at a time and folded
/// through the fixed table `{00->0, 01->1, 11->skip, 10->skip}` to produce
/// the final bit stream.
fn slice_pwm_spe(matrix: &mut BitMatrix, row: usize, pulses: &[Pulse], m: &Modulation, sync_width_us: u32) {
    let Modulation::OokPwmSpe {
        short_width_us,
        long_width_us,
        ..
    } = *m
    else {
        return;
    };
    let Some(sync) = pulses.first() else { return };
    if !m.matches(sync.mark_us, sync_width_us) {
        return;
    }

    let mut raw = Vec::new();
    let mut noise_run = 0u32;
    for p in &pulses[1..] {
        if m.matches(p.space_us, short_width_us) {
            raw.push(false);
            noise_run = 0;
        } else if m.matches(p.space_us, long_width_us) {
            raw.push(true);
            noise_run = 0;
        } else {
            noise_run += 1;
            if noise_run >= MAX_CONSECUTIVE_NOISE_PULSES {
                break;
            }
        }
    }

    for pair in raw.chunks(2) {
        let [a, b] = pair else { break };
        match (a, b) {
            (false, false) => {
                if matrix.add_bit(row, false).is_err() {
                    break;
                }
            }
            (false, true) => {
                if matrix.add_bit(row, true).is_err() {
                    break;
                }
            }
            // (true, true) and (true, false) are both skipped per the
            // fixed fold table.
            _ => {}
        }
    }
}

/// PCM: each pulse is a run of one cell width (`short_width_us`, identical
/// to `long_width_us` for every FSK-PCM/OOK-PCM modulation declared so far)
/// carrying some number of back-to-back same-level bits: a mark of `n`
/// cells emits `n` ones, the following space emits `n` zeros, `^ inverted`.
/// Run length is `round(width / cell)`, matching the cell-expansion scheme
/// `slice_manchester` uses for its own line code.
fn slice_pcm(matrix: &mut BitMatrix, row: usize, pulses: &[Pulse], m: &Modulation, inverted: bool) {
    let Modulation::Pcm { short_width_us, .. } = *m else {
        return;
    };
    if short_width_us == 0 {
        return;
    }
    let cell = short_width_us as f64;
    let tol = m.effective_tolerance_us();
    let mut noise_run = 0u32;
    'outer: for p in pulses {
        for (width, level) in [(p.mark_us, true), (p.space_us, false)] {
            if width == 0 {
                continue;
            }
            let count = (width as f64 / cell).round() as i64;
            let count = count.max(1) as u32;
            let remainder = (width as i64 - count as i64 * short_width_us as i64).unsigned_abs() as u32;
            if remainder > tol * count.max(1) {
                noise_run += 1;
                if noise_run >= MAX_CONSECUTIVE_NOISE_PULSES {
                    break 'outer;
                }
                continue;
            }
            noise_run = 0;
            for _ in 0..count {
                if matrix.add_bit(row, level ^ inverted).is_err() {
                    break 'outer;
                }
            }
        }
    }
}

/// Manchester family: expand each pulse's mark/space into
/// `half_bit_width_us`-sized raw transition cells (mark → `1`s, space →
/// `0`s), then decode pairs of cells via [`BitMatrix::manchester_decode`] or
/// [`BitMatrix::differential_manchester_decode`].
fn slice_manchester(
    matrix: &mut BitMatrix,
    row: usize,
    pulses: &[Pulse],
    half_bit_width_us: u32,
    m: &Modulation,
    differential: bool,
) {
    if half_bit_width_us == 0 {
        return;
    }
    let mut raw = BitMatrix::new();
    let tol = m.effective_tolerance_us();
    let mut noise_run = 0u32;
    'outer: for p in pulses {
        for (width, level) in [(p.mark_us, true), (p.space_us, false)] {
            if width == 0 {
                continue;
            }
            let cells = ((width as f64) / (half_bit_width_us as f64)).round() as i64;
            let cells = cells.max(1) as u32;
            let remainder = (width as i64 - cells as i64 * half_bit_width_us as i64).unsigned_abs() as u32;
            if remainder > tol * cells.max(1) {
                noise_run += 1;
                if noise_run >= MAX_CONSECUTIVE_NOISE_PULSES {
                    break 'outer;
                }
                continue;
            }
            noise_run = 0;
            for _ in 0..cells {
                if raw.add_bit(0, level).is_err() {
                    break 'outer;
                }
            }
        }
    }

    let mut decoded = Vec::new();
    if differential {
        raw.differential_manchester_decode(0, 0, &mut decoded, crate::bitmatrix::N_COLS_BITS);
    } else {
        raw.manchester_decode(0, 0, &mut decoded, crate::bitmatrix::N_COLS_BITS);
    }
    for bit in decoded {
        if matrix.add_bit(row, bit).is_err() {
            break;
        }
    }
}
