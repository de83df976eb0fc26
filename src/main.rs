//! Headless pipeline runner: reads a raw Cs8 IQ capture file, runs it
//! through the pulse detector / slicer / decoder registry, and writes
//! decoded records as line-JSON to stdout.
//!
//! This binary is a thin, illustrative driver, not a product surface —
//! concrete sample sources (RTL-SDR, SoapySDR, …) and sinks (MQTT,
//! InfluxDB, syslog, …) are named interfaces only and live outside this
//! crate. `FileSource`/`JsonLinesSink` below exist only to give the library
//! something to run end-to-end from the command line.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulserx::config::PipelineConfig;
use pulserx::decoders;
use pulserx::dispatcher::Dispatcher;
use pulserx::error::{SinkError, SourceError};
use pulserx::pulse::{DemodPath, PulseDetector};
use pulserx::record::Record;
use pulserx::sample::{sample_from_cs8, Sample, SampleFormat};
use pulserx::sink::Sink;
use pulserx::slicer::PulseSlicer;
use pulserx::source::{Source, SourceInfo};

/// Reads a flat file of interleaved signed-8-bit I/Q pairs (HackRF-native
/// `Cs8` layout) in fixed-size chunks.
struct FileSource {
    file: File,
    info: SourceInfo,
}

impl FileSource {
    fn open(path: &PathBuf, sample_rate_hz: u32, center_frequency_hz: u32) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            info: SourceInfo {
                sample_rate_hz,
                center_frequency_hz,
                format: SampleFormat::Cs8,
            },
        })
    }
}

impl Source for FileSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn read(&mut self, buf: &mut [Sample]) -> Result<usize, SourceError> {
        let mut raw = vec![0u8; buf.len() * 2];
        let mut filled = 0;
        loop {
            match self.file.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled == raw.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SourceError::Io(e)),
            }
        }
        let pairs = filled / 2;
        for (i, chunk) in raw[..pairs * 2].chunks_exact(2).enumerate() {
            buf[i] = sample_from_cs8(chunk[0] as i8, chunk[1] as i8);
        }
        Ok(pairs)
    }
}

/// Writes one JSON object per line, the simplest of the named sink formats
/// this crate's interfaces anticipate (line-JSON, CSV, MQTT, InfluxDB, syslog, raw hex).
struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn write(&mut self, record: &Record) -> Result<(), SinkError> {
        let json = record_to_json(record);
        writeln!(self.out, "{json}").map_err(SinkError::Io)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush().map_err(SinkError::Io)
    }
}

fn record_to_json(record: &Record) -> serde_json::Value {
    use pulserx::record::FieldValue;
    let mut map = serde_json::Map::new();
    for (name, value) in record.iter() {
        let v = match value {
            FieldValue::Str(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(n) => serde_json::Value::from(*n),
            FieldValue::Double(d) => serde_json::json!(d),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::HexBytes(b) => serde_json::Value::String(encode_hex(b)),
            FieldValue::Nested(r) => record_to_json(r),
        };
        map.insert(name.clone(), v);
    }
    serde_json::Value::Object(map)
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

const READ_CHUNK_SAMPLES: usize = 16_384;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "pulserx=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: pulserx <cs8-iq-capture-file> [sample_rate_hz] [center_freq_hz]");
        std::process::exit(2);
    };
    let sample_rate_hz: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(2_000_000);
    let center_frequency_hz: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(433_920_000);

    let config = PipelineConfig::load_or_default(&PathBuf::from("pulserx.toml"));

    let mut registry = pulserx::registry::DecoderRegistry::new();
    decoders::register_all(&mut registry);
    for name in &config.disabled_decoders {
        registry.disable(name);
    }

    let am_limits = registry.limits_for_path(DemodPath::Am);
    let fm_limits = registry.limits_for_path(DemodPath::Fm);

    let mut dispatcher = Dispatcher::new(registry)
        .with_dedup_window(chrono::Duration::milliseconds(config.dedup_window_ms))
        .with_pulse_data_sidecar(config.emit_pulse_data);
    let slicer = PulseSlicer;

    let stdout = BufWriter::new(io::stdout());
    let mut sink = JsonLinesSink { out: stdout };

    let mut source = FileSource::open(&PathBuf::from(&path), sample_rate_hz, center_frequency_hz)?;
    let mut am_detector = PulseDetector::new(sample_rate_hz, DemodPath::Am, am_limits);
    let mut fm_detector = PulseDetector::new(sample_rate_hz, DemodPath::Fm, fm_limits);

    let mut buf = vec![Sample::Real(0.0); READ_CHUNK_SAMPLES];
    let mut total_records = 0u64;
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];

        if let Some(pkg) = am_detector.process_samples(chunk) {
            let records = dispatcher.dispatch(&pkg, &slicer, Utc::now());
            total_records += records.len() as u64;
            for r in records {
                let _ = sink.write(&r);
            }
        }
        if let Some(pkg) = fm_detector.process_samples(chunk) {
            let records = dispatcher.dispatch(&pkg, &slicer, Utc::now());
            total_records += records.len() as u64;
            for r in records {
                let _ = sink.write(&r);
            }
        }
    }

    sink.out.flush().ok();
    tracing::info!(total_records, "capture replay finished");
    Ok(())
}
