//! EcoWitt WH40 rain gauge: FSK-PCM, 56µs, CRC-8 + byte-sum check.

use crate::bitmatrix::BitMatrix;
use crate::integrity::{add_bytes, crc8};
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, Package};
use crate::record::Record;
use crate::registry::{DecodeOutcome, Decoder};

const PREAMBLE: [u8; 3] = [0xaa, 0x2d, 0xd4];
const PAYLOAD_BYTES: usize = 9;
const ROW_BITS: usize = (PREAMBLE.len() + PAYLOAD_BYTES) * 8;

pub struct EcowittWh40Decoder;

impl Decoder for EcowittWh40Decoder {
    fn name(&self) -> &str {
        "ecowitt_wh40"
    }

    fn modulation(&self) -> Modulation {
        Modulation::Pcm {
            short_width_us: 56,
            long_width_us: 56,
            tolerance_us: 15,
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
        30_000
    }

    fn min_row_bits(&self) -> usize {
        ROW_BITS
    }

    fn decode(&self, matrix: &BitMatrix, row: usize, _package: &Package) -> DecodeOutcome {
        if matrix.bits_in_row(row) < ROW_BITS {
            return DecodeOutcome::AbortLength;
        }
        let mut preamble = [0u8; 3];
        matrix.extract_bytes(row, 0, 24, &mut preamble);
        if preamble != PREAMBLE {
            return DecodeOutcome::FailSanity;
        }

        let mut b = [0u8; PAYLOAD_BYTES];
        matrix.extract_bytes(row, 24, PAYLOAD_BYTES * 8, &mut b);
        if b[0] != 0x40 {
            return DecodeOutcome::FailSanity;
        }
        if crc8(&b[..8], 0x31, 0x00) != 0 {
            return DecodeOutcome::FailMic;
        }
        if add_bytes(&b[..8]) != b[8] {
            return DecodeOutcome::FailMic;
        }

        let id = u16::from_be_bytes([b[1], b[2]]);
        let battery_ok = b[3] & 0x10 == 0;
        let raw_rain = (((b[4] as u32) << 8) | b[5] as u32) as f64;

        let mut r = Record::new();
        r.push("model", "EcoWitt-WH40")
            .push("id", id as i64)
            .push("mic", "CRC")
            .push("battery_ok", battery_ok)
            .push("rain_mm", raw_rain * 0.1);
        DecodeOutcome::Ok(vec![r])
    }
}
