//! Decoder registration and per-package fan-out dispatch.
//!
//! Every enabled decoder gets a chance at every matching package (no
//! first-match-wins short-circuiting); matching gates on modulation family
//! and demodulator path, and outcomes are a tagged enum rather than a plain
//! success/failure bool.

use std::collections::HashMap;

use crate::bitmatrix::BitMatrix;
use crate::error::ConfigError;
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, DetectorLimits, Package};
use crate::record::Record;
use crate::slicer::Slicer;

/// Result of running one decoder against one bit row.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Decoded successfully; zero or more records (a decoder may split one
    /// row into several logical readings, e.g. a multi-sensor frame).
    Ok(Vec<Record>),
    /// Row was shorter than the decoder's minimum viable preamble — not
    /// even worth a sanity check.
    AbortEarly,
    /// Row length didn't match any frame length this decoder knows.
    AbortLength,
    /// A structural sanity check failed (e.g. a fixed marker field, a
    /// repeated-nibble check) before integrity verification was attempted.
    FailSanity,
    /// Message integrity check (CRC/checksum/LFSR) failed.
    FailMic,
    /// Decoder is registered but administratively disabled.
    Disabled,
}

/// A registered decoder: immutable identity/matching parameters plus the
/// decode function itself.
pub trait Decoder: Send + Sync {
    fn name(&self) -> &str;
    fn modulation(&self) -> Modulation;
    fn path(&self) -> DemodPath;
    /// Minimum gap, in microseconds, that ends one row of this decoder's
    /// transmissions (contributes to the registry-wide [`DetectorLimits::gap_limit_us`]).
    fn gap_limit_us(&self) -> u32;
    /// Minimum gap, in microseconds, that ends an entire package of this
    /// decoder's transmissions (contributes to [`DetectorLimits::reset_limit_us`]).
    fn reset_limit_us(&self) -> u32;
    /// Shortest row, in bits, worth attempting to decode.
    fn min_row_bits(&self) -> usize;

    fn decode(&self, matrix: &BitMatrix, row: usize, package: &Package) -> DecodeOutcome;

    /// Apply one `key=value` configuration parameter. The default rejects
    /// everything — decoders with tunable parameters override this.
    fn configure(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        Err(ConfigError::UnknownKey {
            decoder: self.name().to_string(),
            key: key.to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DecoderCounters {
    attempts: u64,
    ok: u64,
    abort_early: u64,
    abort_length: u64,
    fail_sanity: u64,
    fail_mic: u64,
}

struct Entry {
    decoder: Box<dyn Decoder>,
    enabled: bool,
    counters: DecoderCounters,
}

/// Holds every registered decoder and dispatches packages to all enabled,
/// path-matching decoders in registration order.
#[derive(Default)]
pub struct DecoderRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder, enabled by default. Panics if the name is
    /// already registered — a programming error, not a runtime condition.
    pub fn register(&mut self, decoder: Box<dyn Decoder>) {
        let name = decoder.name().to_string();
        assert!(
            !self.index.contains_key(&name),
            "decoder {name:?} already registered"
        );
        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            decoder,
            enabled: true,
            counters: DecoderCounters::default(),
        });
    }

    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        if let Some(&i) = self.index.get(name) {
            self.entries[i].enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn configure(&mut self, name: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDecoder(name.to_string()))?;
        self.entries[i].decoder.configure(key, value)
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.index.get(name).map(|&i| self.entries[i].enabled)
    }

    /// Aggregate gap/reset limits across all currently enabled decoders,
    /// for the given demodulator path — the pulse detector uses these to
    /// decide row/package boundaries.
    pub fn limits_for_path(&self, path: DemodPath) -> DetectorLimits {
        let mut gap_limit_us = u32::MAX;
        let mut reset_limit_us = 0u32;
        for e in self.entries.iter().filter(|e| e.enabled && e.decoder.path() == path) {
            gap_limit_us = gap_limit_us.min(e.decoder.gap_limit_us());
            reset_limit_us = reset_limit_us.max(e.decoder.reset_limit_us());
        }
        if gap_limit_us == u32::MAX {
            DetectorLimits::default()
        } else {
            DetectorLimits {
                gap_limit_us,
                reset_limit_us: reset_limit_us.max(gap_limit_us),
            }
        }
    }

    /// Run every enabled, path-matching decoder against every row of
    /// `package`, slicing bits fresh per decoder (each decoder may use a
    /// different modulation). Returns one [`DispatchItem`] per (decoder,
    /// row) attempt, in decoder-registration then row order — the
    /// [`crate::dispatcher::Dispatcher`] uses this to dedup and count
    /// before collapsing to plain records.
    pub fn dispatch_detailed(&mut self, package: &Package, slicer: &dyn Slicer) -> Vec<DispatchItem> {
        let mut out = Vec::new();
        let row_count = package.row_count();
        for entry in self.entries.iter_mut() {
            if !entry.enabled || entry.decoder.path() != package.path {
                continue;
            }
            let modulation = entry.decoder.modulation();
            let matrix = slicer.slice(package, &modulation);
            for row in 0..row_count {
                let bits = matrix.bits_in_row(row);
                if bits < entry.decoder.min_row_bits() {
                    entry.counters.abort_early += 1;
                    continue;
                }
                entry.counters.attempts += 1;
                let outcome = entry.decoder.decode(&matrix, row, package);
                match &outcome {
                    DecodeOutcome::Ok(_) => entry.counters.ok += 1,
                    DecodeOutcome::AbortEarly => entry.counters.abort_early += 1,
                    DecodeOutcome::AbortLength => entry.counters.abort_length += 1,
                    DecodeOutcome::FailSanity => entry.counters.fail_sanity += 1,
                    DecodeOutcome::FailMic => entry.counters.fail_mic += 1,
                    DecodeOutcome::Disabled => {}
                }
                out.push(DispatchItem {
                    decoder_name: entry.decoder.name().to_string(),
                    row,
                    fingerprint: row_fingerprint(&matrix, row, bits),
                    outcome,
                });
            }
        }
        out
    }

    /// Convenience wrapper over [`Self::dispatch_detailed`] for callers that
    /// don't need dedup/counters — every successful record, discarding the
    /// rest.
    pub fn dispatch(&mut self, package: &Package, slicer: &dyn Slicer) -> Vec<Record> {
        self.dispatch_detailed(package, slicer)
            .into_iter()
            .filter_map(|item| match item.outcome {
                DecodeOutcome::Ok(records) => Some(records),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn decoder_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.decoder.name())
    }

    pub fn counters(&self, name: &str) -> Option<(u64, u64, u64, u64, u64, u64)> {
        self.index.get(name).map(|&i| {
            let c = &self.entries[i].counters;
            (c.attempts, c.ok, c.abort_early, c.abort_length, c.fail_sanity, c.fail_mic)
        })
    }
}

/// One (decoder, row) dispatch attempt and its outcome.
pub struct DispatchItem {
    pub decoder_name: String,
    pub row: usize,
    pub fingerprint: u64,
    pub outcome: DecodeOutcome,
}

fn row_fingerprint(matrix: &BitMatrix, row: usize, bits: usize) -> u64 {
    use std::hash::{Hash, Hasher};
    let num_bits = bits.min(crate::bitmatrix::N_COLS_BITS);
    let num_bytes = num_bits.div_ceil(8).max(1);
    let mut buf = vec![0u8; num_bytes];
    matrix.extract_bytes(row, 0, num_bits, &mut buf);
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    buf.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmatrix::N_COLS_BITS;

    struct AlwaysOk {
        min_bits: usize,
    }
    impl Decoder for AlwaysOk {
        fn name(&self) -> &str {
            "always_ok"
        }
        fn modulation(&self) -> Modulation {
            Modulation::Pcm {
                short_width_us: 100,
                long_width_us: 200,
                tolerance_us: 20,
                inverted: false,
            }
        }
        fn path(&self) -> DemodPath {
            DemodPath::Am
        }
        fn gap_limit_us(&self) -> u32 {
            1000
        }
        fn reset_limit_us(&self) -> u32 {
            50_000
        }
        fn min_row_bits(&self) -> usize {
            self.min_bits
        }
        fn decode(&self, _matrix: &BitMatrix, _row: usize, _package: &Package) -> DecodeOutcome {
            let mut r = Record::new();
            r.push("model", "test");
            DecodeOutcome::Ok(vec![r])
        }
    }

    struct DummySlicer;
    impl Slicer for DummySlicer {
        fn slice(&self, _package: &Package, _modulation: &Modulation) -> BitMatrix {
            let mut m = BitMatrix::new();
            for _ in 0..8 {
                let _ = m.add_bit(0, true);
            }
            m
        }
    }

    fn sample_package() -> Package {
        Package {
            path: DemodPath::Am,
            pulses: vec![crate::pulse::Pulse { mark_us: 100, space_us: 100 }],
            row_ends: vec![0],
            sample_rate_hz: 2_000_000,
            center_frequency_hz: 433_920_000,
            rssi_db: -10.0,
            noise_db: -30.0,
            snr_db: 20.0,
            freq1_hz: 0.0,
            freq2_hz: 0.0,
            truncated: false,
        }
    }

    #[test]
    fn disabled_decoder_is_skipped() {
        let mut reg = DecoderRegistry::new();
        reg.register(Box::new(AlwaysOk { min_bits: 1 }));
        reg.disable("always_ok");
        let out = reg.dispatch(&sample_package(), &DummySlicer);
        assert!(out.is_empty());
    }

    #[test]
    fn enabled_decoder_fans_out_and_collects_records() {
        let mut reg = DecoderRegistry::new();
        reg.register(Box::new(AlwaysOk { min_bits: 1 }));
        let out = reg.dispatch(&sample_package(), &DummySlicer);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn min_row_bits_gates_decode_as_abort_early() {
        let mut reg = DecoderRegistry::new();
        reg.register(Box::new(AlwaysOk { min_bits: N_COLS_BITS }));
        let out = reg.dispatch(&sample_package(), &DummySlicer);
        assert!(out.is_empty());
    }

    #[test]
    fn limits_aggregate_min_gap_and_max_reset_across_enabled_decoders() {
        let mut reg = DecoderRegistry::new();
        reg.register(Box::new(AlwaysOk { min_bits: 1 }));
        let limits = reg.limits_for_path(DemodPath::Am);
        assert_eq!(limits.gap_limit_us, 1000);
        assert_eq!(limits.reset_limit_us, 50_000);
    }

    #[test]
    fn unknown_decoder_configure_returns_config_error() {
        let mut reg = DecoderRegistry::new();
        reg.register(Box::new(AlwaysOk { min_bits: 1 }));
        let err = reg.configure("nope", "k", "v").unwrap_err();
        assert_eq!(err, ConfigError::UnknownDecoder("nope".to_string()));
    }
}
