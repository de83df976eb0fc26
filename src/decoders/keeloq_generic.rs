//! Generic KeeLoq rolling-code decoder: OOK-PCM, 64-bit frame (32-bit
//! encrypted "hop" half + 32-bit plaintext "fix" half), simple- and
//! normal-learning decrypt against caller-supplied manufacturer keys.
//!
//! Tries each configured key under both simple learning and normal
//! learning (derived from the frame's plaintext serial) before giving up.
//! Registered disabled by default: no manufacturer key material ships with
//! this crate, so it only ever decodes once a caller `configure`s at least
//! one key.

use std::sync::Mutex;

use crate::bitmatrix::BitMatrix;
use crate::error::ConfigError;
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, Package};
use crate::record::Record;
use crate::registry::{DecodeOutcome, Decoder};

use crate::protocols::keeloq_common::{keeloq_decrypt, keeloq_normal_learning};

const ROW_BITS: usize = 64;

pub struct KeeloqGenericDecoder {
    /// (name, manufacturer key) pairs installed via `configure("key", "name:hex")`.
    keys: Mutex<Vec<(String, u64)>>,
}

impl Default for KeeloqGenericDecoder {
    fn default() -> Self {
        Self {
            keys: Mutex::new(Vec::new()),
        }
    }
}

impl Decoder for KeeloqGenericDecoder {
    fn name(&self) -> &str {
        "keeloq_generic"
    }

    fn modulation(&self) -> Modulation {
        Modulation::Pcm {
            short_width_us: 400,
            long_width_us: 800,
            tolerance_us: 140,
            inverted: false,
        }
    }

    fn path(&self) -> DemodPath {
        DemodPath::Am
    }

    fn gap_limit_us(&self) -> u32 {
        940
    }

    fn reset_limit_us(&self) -> u32 {
        15_000
    }

    fn min_row_bits(&self) -> usize {
        ROW_BITS
    }

    /// `key=<name>:<16 hex digits>` installs (or replaces) one manufacturer
    /// key under `<name>`. No other parameter keys are recognized.
    fn configure(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        if key != "key" {
            return Err(ConfigError::UnknownKey {
                decoder: self.name().to_string(),
                key: key.to_string(),
            });
        }
        let (name, hex) = value.split_once(':').ok_or_else(|| ConfigError::Malformed {
            raw: value.to_string(),
            reason: "expected <name>:<16 hex digits>".to_string(),
        })?;
        let parsed = u64::from_str_radix(hex, 16).map_err(|_| ConfigError::InvalidValue {
            decoder: self.name().to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a 64-bit hex key".to_string(),
        })?;
        let mut keys = self.keys.lock().unwrap();
        if let Some(slot) = keys.iter_mut().find(|(n, _)| n == name) {
            slot.1 = parsed;
        } else {
            keys.push((name.to_string(), parsed));
        }
        Ok(())
    }

    fn decode(&self, matrix: &BitMatrix, row: usize, _package: &Package) -> DecodeOutcome {
        if matrix.bits_in_row(row) < ROW_BITS {
            return DecodeOutcome::AbortLength;
        }
        let mut buf = [0u8; 8];
        matrix.extract_bytes(row, 0, ROW_BITS, &mut buf);
        let hop = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let fix = u32::from_be_bytes(buf[4..8].try_into().unwrap());

        let btn = (fix >> 28) as u8;
        let end_serial = (fix & 0xff) as u8;

        let keys = self.keys.lock().unwrap();
        if keys.is_empty() {
            return DecodeOutcome::Disabled;
        }
        for (name, mf_key) in keys.iter() {
            for key in [*mf_key, mf_key.swap_bytes()] {
                if key == 0 {
                    continue;
                }
                for candidate_key in [key, keeloq_normal_learning(fix, key)] {
                    let decrypt = keeloq_decrypt(hop, candidate_key);
                    let decrypt_btn = (decrypt >> 28) as u8;
                    let decrypt_serial = ((decrypt >> 16) & 0xff) as u8;
                    if decrypt_btn == btn && (decrypt_serial == end_serial || decrypt_serial == 0) {
                        let counter = (decrypt & 0xffff) as i64;
                        let serial = (fix & 0x0fff_ffff) as i64;
                        let mut r = Record::new();
                        r.push("model", "KeeLoq")
                            .push("manufacturer", name.clone())
                            .push("id", format!("{serial:07x}"))
                            .push("button", btn as i64)
                            .push("counter", counter)
                            .push("mic", "CHECKSUM");
                        return DecodeOutcome::Ok(vec![r]);
                    }
                }
            }
        }
        DecodeOutcome::FailMic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_from(hop: u32, fix: u32) -> BitMatrix {
        let mut m = BitMatrix::new();
        for &byte in hop.to_be_bytes().iter().chain(fix.to_be_bytes().iter()) {
            for i in (0..8).rev() {
                let _ = m.add_bit(0, (byte >> i) & 1 != 0);
            }
        }
        m
    }

    fn sample_package() -> Package {
        Package {
            path: DemodPath::Am,
            pulses: vec![],
            row_ends: vec![],
            sample_rate_hz: 1_000_000,
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
    fn with_no_configured_keys_decoder_is_disabled() {
        let decoder = KeeloqGenericDecoder::default();
        let matrix = row_from(0x1234_5678, 0x2000_0099);
        assert_eq!(
            decoder.decode(&matrix, 0, &sample_package()),
            DecodeOutcome::Disabled
        );
    }

    #[test]
    fn configure_rejects_malformed_value() {
        let mut decoder = KeeloqGenericDecoder::default();
        assert!(matches!(
            decoder.configure("key", "no-colon-here"),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn configure_rejects_unknown_key() {
        let mut decoder = KeeloqGenericDecoder::default();
        assert!(matches!(
            decoder.configure("foo", "bar"),
            Err(ConfigError::UnknownKey { .. })
        ));
    }

    #[test]
    fn matching_key_decrypts_a_simple_learning_frame() {
        let mf_key = 0x0123_4567_89ab_cdefu64;
        let btn = 0x3u8;
        let end_serial = 0x42u8;
        let counter = 0x00aau16;
        let serial = 0x0012_3400u32 | end_serial as u32;
        let fix = (serial & 0x0fff_ffff) | ((btn as u32) << 28);
        let plain = ((btn as u32) << 28) | (((end_serial as u32) & 0xff) << 16) | counter as u32;
        let hop = crate::protocols::keeloq_common::keeloq_encrypt(plain, mf_key);

        let mut decoder = KeeloqGenericDecoder::default();
        decoder.configure("key", &format!("acme:{mf_key:016x}")).unwrap();

        let matrix = row_from(hop, fix);
        match decoder.decode(&matrix, 0, &sample_package()) {
            DecodeOutcome::Ok(records) => {
                assert_eq!(
                    records[0].get("manufacturer"),
                    Some(&crate::record::FieldValue::Str("acme".into()))
                );
                assert_eq!(
                    records[0].get("counter"),
                    Some(&crate::record::FieldValue::Int(counter as i64))
                );
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn wrong_key_fails_mic() {
        let mut decoder = KeeloqGenericDecoder::default();
        decoder.configure("key", "acme:0000000000000001").unwrap();
        let matrix = row_from(0xdead_beef, 0x3000_0042);
        assert_eq!(
            decoder.decode(&matrix, 0, &sample_package()),
            DecodeOutcome::FailMic
        );
    }
}
