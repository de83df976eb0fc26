//! Netatmo THW wind gauge: FSK-PCM, CRC-8 payload, four raw anemometer
//! baselines adjustable via `configure`
//! (`netatmo_thw:a=<int>,b=<int>,c=<int>,d=<int>`).
//!
//! Parameterized decoders with string arguments are represented as an
//! explicit configuration map plus a validated constructor that fills a
//! typed context — the only decoder in the corpus whose `configure` call
//! does more than enable/disable.

use crate::bitmatrix::BitMatrix;
use crate::error::ConfigError;
use crate::integrity::crc8;
use crate::modulation::Modulation;
use crate::pulse::{DemodPath, Package};
use crate::record::Record;
use crate::registry::{DecodeOutcome, Decoder};

const PREAMBLE: [u8; 2] = [0xaa, 0x2d];
const PAYLOAD_BYTES: usize = 9;
const ROW_BITS: usize = (PREAMBLE.len() + PAYLOAD_BYTES) * 8;
const CRC8_POLY: u8 = 0x31;

/// Offsets subtracted from each of the four raw wind-component baselines
/// before the north/south and east/west differentials are formed. Each
/// defaults to 0 (no correction) and is set independently by `a=`/`b=`/
/// `c=`/`d=`.
#[derive(Debug, Default, Clone, Copy)]
struct WindOffsets {
    a: i32,
    b: i32,
    c: i32,
    d: i32,
}

pub struct NetatmoThwDecoder {
    offsets: WindOffsets,
}

impl Default for NetatmoThwDecoder {
    fn default() -> Self {
        Self {
            offsets: WindOffsets::default(),
        }
    }
}

impl Decoder for NetatmoThwDecoder {
    fn name(&self) -> &str {
        "netatmo_thw"
    }

    fn modulation(&self) -> Modulation {
        Modulation::Pcm {
            short_width_us: 58,
            long_width_us: 58,
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
        50_000
    }

    fn min_row_bits(&self) -> usize {
        ROW_BITS
    }

    fn configure(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let parsed: i32 = value.parse().map_err(|_| ConfigError::InvalidValue {
            decoder: self.name().to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected an integer".to_string(),
        })?;
        match key {
            "a" => self.offsets.a = parsed,
            "b" => self.offsets.b = parsed,
            "c" => self.offsets.c = parsed,
            "d" => self.offsets.d = parsed,
            other => {
                return Err(ConfigError::UnknownKey {
                    decoder: self.name().to_string(),
                    key: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn decode(&self, matrix: &BitMatrix, row: usize, _package: &Package) -> DecodeOutcome {
        if matrix.bits_in_row(row) < ROW_BITS {
            return DecodeOutcome::AbortLength;
        }

        let mut preamble = [0u8; 2];
        matrix.extract_bytes(row, 0, 16, &mut preamble);
        if preamble != PREAMBLE {
            return DecodeOutcome::FailSanity;
        }

        let mut payload = [0u8; PAYLOAD_BYTES];
        matrix.extract_bytes(row, 16, PAYLOAD_BYTES * 8, &mut payload);

        if crc8(&payload[..PAYLOAD_BYTES - 1], CRC8_POLY, 0x00) != payload[PAYLOAD_BYTES - 1] {
            return DecodeOutcome::FailMic;
        }

        let id = u16::from_be_bytes([payload[0], payload[1]]);
        let battery_ok = payload[2] & 0x80 == 0;

        // Four raw component baselines, each corrected by its configured
        // offset (`a=,b=,c=,d=` via `configure`).
        let north = payload[3] as i32 - self.offsets.a;
        let south = payload[4] as i32 - self.offsets.b;
        let east = payload[5] as i32 - self.offsets.c;
        let west = payload[6] as i32 - self.offsets.d;

        let ns = (north - south) as f64;
        let ew = (east - west) as f64;
        let wind_avg_m_s = (ns * ns + ew * ew).sqrt() * 0.05;
        let mut wind_dir_deg = ew.atan2(ns).to_degrees();
        if wind_dir_deg < 0.0 {
            wind_dir_deg += 360.0;
        }

        let mut r = Record::new();
        r.push("model", "Netatmo-THW")
            .push("id", id as i64)
            .push("mic", "CRC")
            .push("battery_ok", battery_ok)
            .push("wind_avg_m_s", wind_avg_m_s)
            .push("wind_dir_deg", wind_dir_deg);
        DecodeOutcome::Ok(vec![r])
    }
}
