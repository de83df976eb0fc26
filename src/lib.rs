//! pulserx — pulse-train detection, slicing, and protocol-decode dispatch
//! for ISM-band telemetry receivers.
//!
//! The library owns the core pipeline (demodulator → pulse detector →
//! slicer → decoder registry → dispatcher); hardware sources, concrete
//! sinks, and the bulk of per-device decoders are external collaborators
//! behind the [`source::Source`] / [`sink::Sink`] traits and the
//! [`registry::Decoder`] trait, respectively.

pub mod bitmatrix;
pub mod config;
pub mod decoders;
pub mod dispatcher;
pub mod error;
pub mod integrity;
pub mod modulation;
pub mod partial_assembler;
pub mod protocols;
pub mod pulse;
pub mod record;
pub mod registry;
pub mod sample;
pub mod sink;
pub mod slicer;
pub mod source;
