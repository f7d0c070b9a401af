//! WAV fixture generation
//!
//! Silent mono files of an exact length, so the library probe reports a
//! known duration.

use hound::{WavSpec, WavWriter};
use std::path::Path;

/// Low rate keeps fixtures small; only the duration matters
const TEST_SAMPLE_RATE: u32 = 8000;

pub fn generate_silent_wav<P: AsRef<Path>>(path: P, seconds: u32) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..TEST_SAMPLE_RATE * seconds {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}
