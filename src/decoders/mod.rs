//! Representative per-device decoder bodies exercising every seam of the
//! pulse pipeline. Each is a thin [`crate::registry::Decoder`] built only
//! from [`crate::integrity`]/[`crate::bitmatrix`] primitives — none
//! implements its own CRC/LFSR loop or Manchester state machine.

pub mod bresser_7in1;
pub mod ecowitt_wh40;
pub mod infactory_temp;
pub mod keeloq_generic;
pub mod netatmo_thw;
pub mod pmv107j_tpms;
pub mod secplus_v2;
pub mod voltcraft_ec3k;

use crate::registry::DecoderRegistry;

/// Registers every decoder this crate ships. `keeloq_generic` is disabled at startup
/// (no manufacturer key material ships with this crate; a caller installs
/// keys via `configure("keeloq_generic", "key", "<name>:<hex>")` then
/// re-enables it).
pub fn register_all(registry: &mut DecoderRegistry) {
    registry.register(Box::new(bresser_7in1::Bresser7in1Decoder));
    registry.register(Box::new(ecowitt_wh40::EcowittWh40Decoder));
    registry.register(Box::new(pmv107j_tpms::Pmv107jTpmsDecoder));
    registry.register(Box::new(voltcraft_ec3k::VoltcraftEc3kDecoder));
    registry.register(Box::new(infactory_temp::InfactoryTempDecoder));
    registry.register(Box::new(secplus_v2::SecplusV2Decoder::default()));
    registry.register(Box::new(netatmo_thw::NetatmoThwDecoder::default()));
    registry.register(Box::new(keeloq_generic::KeeloqGenericDecoder::default()));
    registry.disable("keeloq_generic");
}
