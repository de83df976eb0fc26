//! PMV-107J Toyota TPMS sensor: FSK-PCM carrier, differential Manchester
//! line code, CRC-8. The differential-Manchester decode
//! itself happens in the slicer (`Modulation::DifferentialManchester`); this
//! decoder only ever sees the already-decoded bit row.

use crate::bitmatrix::BitMatrix;
use crate::integrity::crc8;
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, Package};
use crate::record::Record;
use crate::registry::{DecodeOutcome, Decoder};

const PREAMBLE_BYTE: u8 = 0xf8;
const PREAMBLE_BITS: usize = 7;
const PAYLOAD_BYTES: usize = 9;
const ROW_BITS: usize = PREAMBLE_BITS + PAYLOAD_BYTES * 8;

pub struct Pmv107jTpmsDecoder;

impl Decoder for Pmv107jTpmsDecoder {
    fn name(&self) -> &str {
        "pmv107j_tpms"
    }

    fn modulation(&self) -> Modulation {
        Modulation::DifferentialManchester {
            half_bit_width_us: 50,
            tolerance_us: 12,
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
        if matrix.search(row, 0, &[PREAMBLE_BYTE], PREAMBLE_BITS) != 0 {
            return DecodeOutcome::FailSanity;
        }

        let mut b = [0u8; PAYLOAD_BYTES];
        matrix.extract_bytes(row, PREAMBLE_BITS, PAYLOAD_BYTES * 8, &mut b);

        if b[5] ^ b[6] != 0xff {
            return DecodeOutcome::FailSanity;
        }
        if crc8(&b[..8], 0x13, 0x00) != b[8] {
            return DecodeOutcome::FailMic;
        }

        let id = u32::from_be_bytes([b[1], b[2], b[3], b[4]]);
        let pressure_kpa = (b[5] as f64 - 40.0) * 2.48;
        let temperature_c = b[7] as f64 - 40.0;

        let mut r = Record::new();
        r.push("model", "PMV-107J")
            .push("id", id as i64)
            .push("mic", "CRC")
            .push("pressure_kPa", pressure_kpa)
            .push("temperature_C", temperature_c);
        DecodeOutcome::Ok(vec![r])
    }
}
