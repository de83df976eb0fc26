//! Sample source abstraction — hardware radio, file replay, or a test
//! fixture all implement the same trait.

use crate::error::SourceError;
use crate::sample::{Sample, SampleFormat};

/// Static capture parameters a [`Source`] reports once at startup.
#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub sample_rate_hz: u32,
    pub center_frequency_hz: u32,
    pub format: SampleFormat,
}

/// Anything that can hand over batches of samples: an SDR dongle, a
/// recorded capture file, or a synthetic generator in tests.
pub trait Source {
    fn info(&self) -> SourceInfo;

    /// Fill `buf` with up to `buf.len()` samples, returning the number
    /// actually written. Returning `0` signals end-of-stream (a file
    /// source at EOF); a live radio source should block until at least one
    /// sample is available rather than return `0`.
    fn read(&mut self, buf: &mut [Sample]) -> Result<usize, SourceError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Replays a fixed sample buffer once, then reports end-of-stream —
    /// used by pipeline-level tests that need a deterministic [`Source`]
    /// without a hardware dependency.
    pub struct FixedSource {
        info: SourceInfo,
        samples: Vec<Sample>,
        pos: usize,
    }

    impl FixedSource {
        pub fn new(info: SourceInfo, samples: Vec<Sample>) -> Self {
            Self { info, samples, pos: 0 }
        }
    }

    impl Source for FixedSource {
        fn info(&self) -> SourceInfo {
            self.info
        }

        fn read(&mut self, buf: &mut [Sample]) -> Result<usize, SourceError> {
            let remaining = self.samples.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FixedSource;
    use super::*;
    use num_complex::Complex;

    #[test]
    fn fixed_source_reports_end_of_stream_as_zero() {
        let info = SourceInfo {
            sample_rate_hz: 2_000_000,
            center_frequency_hz: 433_920_000,
            format: SampleFormat::Cs8,
        };
        let mut src = FixedSource::new(info, vec![Sample::Iq(Complex::new(0.1, 0.1))]);
        let mut buf = [Sample::Real(0.0); 4];
        assert_eq!(src.read(&mut buf).unwrap(), 1);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }
}
