//! Wraps a [`DecoderRegistry`] with cross-package deduplication and
//! per-decoder diagnostics.
//!
//! A transmitter typically repeats its frame 2-6 times per button press or
//! sample interval; without dedup every repeat becomes a separate output
//! record. The dedup key is `(decoder_name, id, channel, fingerprint)` —
//! `id`/`channel` come from the decoded record when present (most decoders
//! report one or both), `fingerprint` is a hash of the raw row bits so
//! decoders that report neither still dedup correctly.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::pulse::Package;
use crate::record::{FieldValue, Record};
use crate::registry::{DecodeOutcome, DecoderRegistry};
use crate::slicer::Slicer;

/// Builds the `pulse_data` sidecar record: one record per package carrying
/// the raw pulse list plus capture metadata, useful for debugging decoders
/// against a capture offline. Each pulse is flattened to a `mark_us`/
/// `space_us` nested record rather than a packed byte blob, keeping it
/// readable in a line-JSON sink.
fn pulse_data_record(package: &Package) -> Record {
    let mut r = Record::new();
    r.push("model", "pulse_data");
    r.push("sample_rate", package.sample_rate_hz as i64);
    r.push("freq1_hz", package.freq1_hz as f64);
    r.push("freq2_hz", package.freq2_hz as f64);
    r.push("rssi_db", package.rssi_db as f64);
    r.push("noise_db", package.noise_db as f64);
    r.push("snr_db", package.snr_db as f64);
    for (i, pulse) in package.pulses.iter().enumerate() {
        let mut p = Record::new();
        p.push("mark_us", pulse.mark_us as i64);
        p.push("space_us", pulse.space_us as i64);
        r.push(format!("pulse_{i}"), FieldValue::Nested(p));
    }
    r
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    decoder_name: String,
    id: Option<i64>,
    channel: Option<i64>,
    fingerprint: u64,
}

/// Diagnostics accumulated for the best-of-package decoder — the decoder
/// that progressed furthest (by outcome severity) for a package where no
/// decoder ultimately produced a record. Useful for "why didn't this
/// decode" debugging without logging every attempt at high verbosity.
#[derive(Debug, Clone)]
pub struct PackageDiagnostic {
    pub decoder_name: String,
    pub outcome_label: &'static str,
}

fn outcome_rank(outcome: &DecodeOutcome) -> u8 {
    match outcome {
        DecodeOutcome::Disabled => 0,
        DecodeOutcome::AbortEarly => 1,
        DecodeOutcome::AbortLength => 2,
        DecodeOutcome::FailSanity => 3,
        DecodeOutcome::FailMic => 4,
        DecodeOutcome::Ok(_) => 5,
    }
}

fn outcome_label(outcome: &DecodeOutcome) -> &'static str {
    match outcome {
        DecodeOutcome::Disabled => "disabled",
        DecodeOutcome::AbortEarly => "abort_early",
        DecodeOutcome::AbortLength => "abort_length",
        DecodeOutcome::FailSanity => "fail_sanity",
        DecodeOutcome::FailMic => "fail_mic",
        DecodeOutcome::Ok(_) => "ok",
    }
}

/// Default dedup window: 200ms, long enough to span one burst of repeats
/// from a typical ISM-band remote or sensor without bridging two distinct
/// transmissions a user intentionally sent seconds apart.
pub const DEFAULT_DEDUP_WINDOW_MS: i64 = 200;

/// Dispatches packages through a [`DecoderRegistry`], deduplicating
/// repeated transmissions within a configurable time window.
pub struct Dispatcher {
    registry: DecoderRegistry,
    dedup_window: Duration,
    seen: VecDeque<(DedupKey, DateTime<Utc>)>,
    last_diagnostic: Option<PackageDiagnostic>,
    emit_pulse_data: bool,
}

impl Dispatcher {
    pub fn new(registry: DecoderRegistry) -> Self {
        Self {
            registry,
            dedup_window: Duration::milliseconds(DEFAULT_DEDUP_WINDOW_MS),
            seen: VecDeque::new(),
            last_diagnostic: None,
            emit_pulse_data: false,
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Enables the `pulse_data` metadata sidecar: one extra record per
    /// dispatched package carrying the raw pulse list, off by default since
    /// it roughly doubles output volume and is meant for decoder debugging.
    pub fn with_pulse_data_sidecar(mut self, enabled: bool) -> Self {
        self.emit_pulse_data = enabled;
        self
    }

    pub fn registry(&mut self) -> &mut DecoderRegistry {
        &mut self.registry
    }

    /// Most-progressed decoder outcome for the last package that produced
    /// no accepted record (for logging at debug verbosity).
    pub fn last_diagnostic(&self) -> Option<&PackageDiagnostic> {
        self.last_diagnostic.as_ref()
    }

    /// Dispatch one package, returning deduplicated records. `now` is
    /// supplied by the caller rather than read internally, keeping this
    /// deterministic and independent of wall-clock access.
    pub fn dispatch(&mut self, package: &Package, slicer: &dyn Slicer, now: DateTime<Utc>) -> Vec<Record> {
        self.evict_expired(now);

        let items = self.registry.dispatch_detailed(package, slicer);

        let mut best_rank = 0u8;
        let mut best: Option<PackageDiagnostic> = None;
        let mut out = Vec::new();

        for item in items {
            let rank = outcome_rank(&item.outcome);
            if rank >= best_rank {
                best_rank = rank;
                best = Some(PackageDiagnostic {
                    decoder_name: item.decoder_name.clone(),
                    outcome_label: outcome_label(&item.outcome),
                });
            }

            let DecodeOutcome::Ok(records) = item.outcome else {
                continue;
            };

            let (id, channel) = records
                .first()
                .map(|r| (as_i64(r.get("id")), as_i64(r.get("channel"))))
                .unwrap_or((None, None));
            let key = DedupKey {
                decoder_name: item.decoder_name,
                id,
                channel,
                fingerprint: item.fingerprint,
            };
            if self.seen.iter().any(|(k, _)| k == &key) {
                continue;
            }
            self.seen.push_back((key, now));
            out.extend(records);
        }

        self.last_diagnostic = if out.is_empty() { best } else { None };
        if let Some(diag) = &self.last_diagnostic {
            if diag.outcome_label == "fail_mic" {
                tracing::debug!(decoder = diag.decoder_name, "integrity check failed, no record emitted");
            }
        }

        if self.emit_pulse_data {
            out.push(pulse_data_record(package));
        }
        out
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        while let Some((_, seen_at)) = self.seen.front() {
            if now.signed_duration_since(*seen_at) > self.dedup_window {
                self.seen.pop_front();
            } else {
                break;
            }
        }
    }
}

fn as_i64(v: Option<&FieldValue>) -> Option<i64> {
    match v {
        Some(FieldValue::Int(n)) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmatrix::BitMatrix;
    use crate::modulation::Modulation;
    use crate::pulse::{DemodPath, Pulse};
    use crate::registry::Decoder;

    struct Constant {
        record: Record,
    }
    impl Decoder for Constant {
        fn name(&self) -> &str {
            "constant"
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
            1
        }
        fn decode(&self, _matrix: &BitMatrix, _row: usize, _package: &Package) -> DecodeOutcome {
            DecodeOutcome::Ok(vec![self.record.clone()])
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
            pulses: vec![Pulse { mark_us: 100, space_us: 100 }],
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

    fn record_with_id(id: i64) -> Record {
        let mut r = Record::new();
        r.push("model", "constant").push("id", id);
        r
    }

    #[test]
    fn repeated_transmission_within_window_is_deduped() {
        let mut registry = DecoderRegistry::new();
        registry.register(Box::new(Constant { record: record_with_id(7) }));
        let mut dispatcher = Dispatcher::new(registry);
        let t0 = Utc::now();
        let pkg = sample_package();
        let first = dispatcher.dispatch(&pkg, &DummySlicer, t0);
        let second = dispatcher.dispatch(&pkg, &DummySlicer, t0 + Duration::milliseconds(50));
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn transmission_after_window_expires_is_reported_again() {
        let mut registry = DecoderRegistry::new();
        registry.register(Box::new(Constant { record: record_with_id(7) }));
        let mut dispatcher = Dispatcher::new(registry);
        let t0 = Utc::now();
        let pkg = sample_package();
        dispatcher.dispatch(&pkg, &DummySlicer, t0);
        let later = dispatcher.dispatch(&pkg, &DummySlicer, t0 + Duration::milliseconds(300));
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn different_ids_are_not_deduped_against_each_other() {
        let mut registry = DecoderRegistry::new();
        registry.register(Box::new(Constant { record: record_with_id(1) }));
        let mut dispatcher = Dispatcher::new(registry);
        let t0 = Utc::now();
        let pkg = sample_package();
        let out = dispatcher.dispatch(&pkg, &DummySlicer, t0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("id"), Some(&FieldValue::Int(1)));
    }

    #[test]
    fn pulse_data_sidecar_is_off_by_default_and_opt_in() {
        let mut registry = DecoderRegistry::new();
        registry.register(Box::new(Constant { record: record_with_id(1) }));
        let pkg = sample_package();

        let mut plain = Dispatcher::new(registry);
        let out = plain.dispatch(&pkg, &DummySlicer, Utc::now());
        assert_eq!(out.len(), 1);

        let mut registry2 = DecoderRegistry::new();
        registry2.register(Box::new(Constant { record: record_with_id(1) }));
        let mut sidecar = Dispatcher::new(registry2).with_pulse_data_sidecar(true);
        let out = sidecar.dispatch(&pkg, &DummySlicer, Utc::now());
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].get("model"), Some(&FieldValue::Str("pulse_data".to_string())));
        assert_eq!(out[1].get("sample_rate"), Some(&FieldValue::Int(2_000_000)));
    }
}
