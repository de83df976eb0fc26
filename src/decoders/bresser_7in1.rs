//! Bresser 7-in-1 weather station: FSK-PCM, 124µs bit cells, whitened
//! payload with an LFSR-16 digest.

use crate::bitmatrix::BitMatrix;
use crate::integrity::lfsr_digest16;
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, Package};
use crate::record::Record;
use crate::registry::{DecodeOutcome, Decoder};

const PREAMBLE: [u8; 5] = [0xaa, 0xaa, 0xaa, 0x2d, 0xd4];
const PAYLOAD_BYTES: usize = 23;
const ROW_BITS: usize = (PREAMBLE.len() + PAYLOAD_BYTES) * 8;
const LFSR_GEN: u16 = 0x8810;
const LFSR_KEY: u16 = 0xba95;
const LFSR_FINAL_XOR: u16 = 0x6df1;

pub struct Bresser7in1Decoder;

impl Decoder for Bresser7in1Decoder {
    fn name(&self) -> &str {
        "bresser_7in1"
    }

    fn modulation(&self) -> Modulation {
        Modulation::Pcm {
            short_width_us: 124,
            long_width_us: 124,
            tolerance_us: 30,
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
        50_000
    }

    fn min_row_bits(&self) -> usize {
        ROW_BITS
    }

    fn decode(&self, matrix: &BitMatrix, row: usize, _package: &Package) -> DecodeOutcome {
        if matrix.bits_in_row(row) < ROW_BITS {
            return DecodeOutcome::AbortLength;
        }

        let mut preamble = [0u8; 5];
        matrix.extract_bytes(row, 0, 40, &mut preamble);
        if preamble != PREAMBLE {
            return DecodeOutcome::FailSanity;
        }

        let mut payload = [0u8; PAYLOAD_BYTES];
        matrix.extract_bytes(row, 40, PAYLOAD_BYTES * 8, &mut payload);
        for b in payload.iter_mut() {
            *b ^= 0xaa;
        }

        let digest = lfsr_digest16(&payload[..PAYLOAD_BYTES - 2], LFSR_GEN, LFSR_KEY) ^ LFSR_FINAL_XOR;
        let trailer = u16::from_be_bytes([payload[PAYLOAD_BYTES - 2], payload[PAYLOAD_BYTES - 1]]);
        if digest != trailer {
            return DecodeOutcome::FailMic;
        }

        let id = u16::from_be_bytes([payload[0], payload[1]]);
        let temp_raw = (((payload[2] & 0x0f) as i32) << 8) | payload[3] as i32;
        let temperature_c = (temp_raw as f64 - 400.0) / 10.0;
        let humidity = (payload[4] & 0x7f) as i64;
        let wind_avg_raw = payload[5] as i64;
        let wind_gust_raw = payload[6] as i64;
        let wind_dir_raw = payload[7] as i64;
        let battery_ok = payload[2] & 0x80 == 0;

        let mut r = Record::new();
        r.push("model", "Bresser-7in1")
            .push("id", id as i64)
            .push("mic", "CRC")
            .push("battery_ok", battery_ok)
            .push("temperature_C", temperature_c)
            .push("humidity", humidity)
            .push("wind_avg_m_s", wind_avg_raw as f64 * 0.1)
            .push("wind_max_m_s", wind_gust_raw as f64 * 0.1)
            .push("wind_dir_deg", wind_dir_raw as f64 * 22.5);
        DecodeOutcome::Ok(vec![r])
    }
}
