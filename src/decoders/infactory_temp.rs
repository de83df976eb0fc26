//! inFactory temperature/humidity sensor: OOK-PPM, 1850/4050µs gap widths,
//! CRC-4 over the non-checksum bytes.

use crate::bitmatrix::BitMatrix;
use crate::integrity::crc4;
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, Package};
use crate::record::Record;
use crate::registry::{DecodeOutcome, Decoder};

const ROW_BITS: usize = 40;
// Poly taken from the inFactory-family CRC-4 used across the wider rtl_433
// decoder corpus (0x9, init 0).
const CRC4_POLY: u8 = 0x9;

pub struct InfactoryTempDecoder;

impl Decoder for InfactoryTempDecoder {
    fn name(&self) -> &str {
        "infactory_temp"
    }

    fn modulation(&self) -> Modulation {
        Modulation::OokPpm {
            short_width_us: 1850,
            long_width_us: 4050,
            tolerance_us: 300,
        }
    }

    fn path(&self) -> DemodPath {
        DemodPath::Am
    }

    fn gap_limit_us(&self) -> u32 {
        8_000
    }

    fn reset_limit_us(&self) -> u32 {
        60_000
    }

    fn min_row_bits(&self) -> usize {
        ROW_BITS
    }

    fn decode(&self, matrix: &BitMatrix, row: usize, _package: &Package) -> DecodeOutcome {
        if matrix.bits_in_row(row) < ROW_BITS {
            return DecodeOutcome::AbortLength;
        }
        let mut b = [0u8; 5];
        matrix.extract_bytes(row, 0, ROW_BITS, &mut b);

        if b[4] & 0x0f == 0 {
            return DecodeOutcome::FailSanity;
        }

        let reordered = [b[0], b[2], b[3], b[4]];
        if crc4(&reordered, CRC4_POLY, 0) != b[1] >> 4 {
            return DecodeOutcome::FailMic;
        }

        let temp_raw = (b[2] as i32) * 16 + (b[3] as i32) / 16 - 900;
        let temperature_f = temp_raw as f64 * 0.1;
        let channel = (b[4] & 0x03) as i64;

        let mut r = Record::new();
        r.push("model", "inFactory-TH")
            .push("mic", "CRC")
            .push("channel", channel)
            .push("temperature_F", temperature_f);
        DecodeOutcome::Ok(vec![r])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_from(b: &[u8; 5]) -> BitMatrix {
        let mut m = BitMatrix::new();
        for &byte in b.iter() {
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
    fn valid_crc_decodes_temperature_and_channel() {
        let mut b = [0u8; 5];
        b[2] = 100;
        b[3] = 0x50;
        b[4] = 0x02; // channel 2, non-zero lower nibble
        let check = crc4(&[b[0], b[2], b[3], b[4]], CRC4_POLY, 0);
        b[1] = check << 4;

        let matrix = row_from(&b);
        let decoder = InfactoryTempDecoder;
        match decoder.decode(&matrix, 0, &sample_package()) {
            DecodeOutcome::Ok(records) => {
                assert_eq!(records[0].get("channel"), Some(&crate::record::FieldValue::Int(2)));
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn zero_channel_nibble_fails_sanity() {
        let b = [0u8; 5];
        let matrix = row_from(&b);
        let decoder = InfactoryTempDecoder;
        assert_eq!(decoder.decode(&matrix, 0, &sample_package()), DecodeOutcome::FailSanity);
    }
}
