//! Voltcraft EC3k energy monitor: FSK-PCM, 50µs, HDLC-framed over a
//! descrambled NRZI line. Descrambling, NRZI decode, and
//! bit-(un)stuffing are physical-layer concerns the slicer already resolved
//! by the time this decoder sees the row — it only validates framing and
//! the trailing CRC-16-LSB.

use crate::bitmatrix::BitMatrix;
use crate::integrity::crc16lsb;
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, Package};
use crate::record::Record;
use crate::registry::{DecodeOutcome, Decoder};

const FRAME_FLAG: u8 = 0x7e;
const FRAME_BYTES: usize = 39;
const CRC_BYTES: usize = 2;
const ROW_BITS: usize = (1 + FRAME_BYTES + CRC_BYTES) * 8;
const CRC_POLY: u16 = 0x8408;
const CRC_INIT: u16 = 0xffff;

pub struct VoltcraftEc3kDecoder;

impl Decoder for VoltcraftEc3kDecoder {
    fn name(&self) -> &str {
        "voltcraft_ec3k"
    }

    fn modulation(&self) -> Modulation {
        Modulation::Pcm {
            short_width_us: 50,
            long_width_us: 50,
            tolerance_us: 12,
            inverted: false,
        }
    }

    fn path(&self) -> DemodPath {
        DemodPath::Fm
    }

    fn gap_limit_us(&self) -> u32 {
        2_000
    }

    fn reset_limit_us(&self) -> u32 {
        40_000
    }

    fn min_row_bits(&self) -> usize {
        ROW_BITS
    }

    fn decode(&self, matrix: &BitMatrix, row: usize, _package: &Package) -> DecodeOutcome {
        if matrix.bits_in_row(row) < ROW_BITS {
            return DecodeOutcome::AbortLength;
        }
        let mut flag = [0u8; 1];
        matrix.extract_bytes(row, 0, 8, &mut flag);
        if flag[0] != FRAME_FLAG {
            return DecodeOutcome::FailSanity;
        }

        let mut frame = [0u8; FRAME_BYTES];
        matrix.extract_bytes(row, 8, FRAME_BYTES * 8, &mut frame);
        let mut crc_trailer = [0u8; CRC_BYTES];
        matrix.extract_bytes(row, 8 + FRAME_BYTES * 8, CRC_BYTES * 8, &mut crc_trailer);

        let computed = crc16lsb(&frame, CRC_POLY, CRC_INIT);
        let trailer = u16::from_le_bytes(crc_trailer);
        if computed != trailer {
            return DecodeOutcome::FailMic;
        }

        let energy_ws = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let energy2_ws = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let power_raw = u16::from_be_bytes([frame[8], frame[9]]);

        let mut r = Record::new();
        r.push("model", "Voltcraft-EC3k")
            .push("mic", "CRC")
            .push("energy_kWh", energy_ws as f64 / 3_600_000.0)
            // Relationship to `energy_kWh` is unresolved in the source corpus;
            // surfaced uninterpreted rather than guessed at.
            .push("energy2_raw", energy2_ws as i64)
            .push("power_W", power_raw as f64 * 0.1);
        DecodeOutcome::Ok(vec![r])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_from(flag: u8, frame: &[u8; FRAME_BYTES], crc: u16) -> BitMatrix {
        let mut m = BitMatrix::new();
        for i in (0..8).rev() {
            let _ = m.add_bit(0, (flag >> i) & 1 != 0);
        }
        for &byte in frame.iter() {
            for i in (0..8).rev() {
                let _ = m.add_bit(0, (byte >> i) & 1 != 0);
            }
        }
        for byte in crc.to_le_bytes() {
            for i in (0..8).rev() {
                let _ = m.add_bit(0, (byte >> i) & 1 != 0);
            }
        }
        m
    }

    fn sample_package() -> Package {
        Package {
            path: DemodPath::Fm,
            pulses: vec![],
            row_ends: vec![],
            sample_rate_hz: 2_000_000,
            center_frequency_hz: 868_300_000,
            rssi_db: -10.0,
            noise_db: -30.0,
            snr_db: 20.0,
            freq1_hz: 0.0,
            freq2_hz: 0.0,
            truncated: false,
        }
    }

    #[test]
    fn valid_crc_decodes_energy_and_power() {
        let mut frame = [0u8; FRAME_BYTES];
        frame[0..4].copy_from_slice(&3_600_000u32.to_be_bytes()); // 1.0 kWh
        frame[8..10].copy_from_slice(&1000u16.to_be_bytes()); // 100.0 W
        let crc = crc16lsb(&frame, CRC_POLY, CRC_INIT);
        let matrix = row_from(FRAME_FLAG, &frame, crc);
        let decoder = VoltcraftEc3kDecoder;
        match decoder.decode(&matrix, 0, &sample_package()) {
            DecodeOutcome::Ok(records) => {
                assert_eq!(records[0].get("power_W"), Some(&crate::record::FieldValue::Double(100.0)));
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn bad_crc_fails_mic() {
        let frame = [0u8; FRAME_BYTES];
        let matrix = row_from(FRAME_FLAG, &frame, 0xdead);
        let decoder = VoltcraftEc3kDecoder;
        assert_eq!(decoder.decode(&matrix, 0, &sample_package()), DecodeOutcome::FailMic);
    }
}
