//! Raw sample representation declared by a [`crate::source::Source`].

use num_complex::Complex;

/// One input sample: either a complex IQ pair or a single real value.
///
/// The source declares its format once (see [`SampleFormat`]); every sample
/// it hands the demodulator is normalized to this type so the rest of the
/// pipeline never branches on format again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Iq(Complex<f32>),
    Real(f32),
}

impl Sample {
    /// Magnitude used by the AM/envelope path: `|I|+|Q|`-style cheap norm
    /// is avoided in favor of the true envelope `sqrt(I^2+Q^2)` for IQ
    /// input, and the absolute value for real input.
    pub fn envelope(&self) -> f32 {
        match self {
            Sample::Iq(c) => (c.re * c.re + c.im * c.im).sqrt(),
            Sample::Real(r) => r.abs(),
        }
    }

    pub fn as_iq(&self) -> Option<Complex<f32>> {
        match self {
            Sample::Iq(c) => Some(*c),
            Sample::Real(_) => None,
        }
    }
}

/// Wire format a [`crate::source::Source`] declares for its raw sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Complex unsigned 8-bit (RTL-SDR native format): byte pairs, 127-offset.
    Cu8,
    /// Complex signed 8-bit (HackRF native format).
    Cs8,
    /// Complex signed 16-bit.
    Cs16,
    /// Complex 32-bit float.
    Cf32,
    /// Real (single-channel) unsigned 8-bit.
    RealU8,
    /// Real signed 16-bit.
    RealS16,
    /// Real 32-bit float.
    RealF32,
}

impl SampleFormat {
    /// Number of raw buffer elements (bytes for 8-bit formats, units
    /// otherwise) that make up one [`Sample`].
    pub fn elements_per_sample(&self) -> usize {
        match self {
            SampleFormat::Cu8 | SampleFormat::Cs8 | SampleFormat::Cs16 | SampleFormat::Cf32 => 2,
            SampleFormat::RealU8 | SampleFormat::RealS16 | SampleFormat::RealF32 => 1,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.elements_per_sample() == 2
    }
}

/// Decode one raw `i8` IQ pair (HackRF Cs8 convention: signed byte, full
/// scale 128) into a normalized [`Sample::Iq`].
pub fn sample_from_cs8(i: i8, q: i8) -> Sample {
    Sample::Iq(Complex::new(i as f32 / 128.0, q as f32 / 128.0))
}

/// Decode one raw `u8` IQ pair (RTL-SDR convention: unsigned byte, 127.5 mid-scale).
pub fn sample_from_cu8(i: u8, q: u8) -> Sample {
    Sample::Iq(Complex::new(
        (i as f32 - 127.5) / 127.5,
        (q as f32 - 127.5) / 127.5,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_matches_pythagorean_norm() {
        let s = Sample::Iq(Complex::new(3.0, 4.0));
        assert_eq!(s.envelope(), 5.0);
    }

    #[test]
    fn real_envelope_is_abs() {
        assert_eq!(Sample::Real(-2.5).envelope(), 2.5);
    }

    #[test]
    fn cs8_full_scale_round_trips_near_unity() {
        let s = sample_from_cs8(127, -128);
        let c = s.as_iq().unwrap();
        assert!((c.re - 127.0 / 128.0).abs() < 1e-6);
        assert!((c.im + 1.0).abs() < 1e-6);
    }
}
