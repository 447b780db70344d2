//! WAV decoding to raw PCM in the pipeline's working format.
//!
//! Arbitrary sample rates and stereo input are accepted; everything is
//! downmixed to mono and resampled to the target rate. Only 16-bit
//! integer output is produced.

use crate::config::AudioFormat;
use crate::error::{Result, ScribeError};
use crate::ingest::ByteSource;
use std::io::Read;

/// Decodes a WAV stream to little-endian 16-bit PCM bytes at the target
/// format's sample rate, mono.
pub fn decode_to_pcm(reader: impl Read, target: &AudioFormat) -> Result<Vec<u8>> {
    let samples = decode_to_samples(reader, target.sample_rate)?;
    Ok(pcm_bytes(&samples))
}

fn decode_to_samples(reader: impl Read, target_rate: u32) -> Result<Vec<i16>> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| ScribeError::Ingestion {
        message: format!("failed to parse WAV stream: {}", e),
    })?;

    let spec = wav_reader.spec();
    // hound accepts a zero rate in the fmt chunk; resampling cannot.
    if spec.sample_rate == 0 {
        return Err(ScribeError::Ingestion {
            message: "WAV header declares a zero sample rate".to_string(),
        });
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(ScribeError::Ingestion {
            message: format!(
                "unsupported WAV sample format: {:?} at {} bits",
                spec.sample_format, spec.bits_per_sample
            ),
        });
    }

    let raw_samples: Vec<i16> = wav_reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ScribeError::Ingestion {
            message: format!("failed to read WAV samples: {}", e),
        })?;

    let mono_samples = if spec.channels == 2 {
        raw_samples
            .chunks_exact(2)
            .map(|pair| {
                let left = pair[0] as i32;
                let right = pair[1] as i32;
                ((left + right) / 2) as i16
            })
            .collect()
    } else if spec.channels == 1 {
        raw_samples
    } else {
        return Err(ScribeError::Ingestion {
            message: format!("unsupported channel count: {}", spec.channels),
        });
    };

    if spec.sample_rate != target_rate {
        Ok(resample(&mono_samples, spec.sample_rate, target_rate))
    } else {
        Ok(mono_samples)
    }
}

/// Serializes samples as little-endian 16-bit PCM.
fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

/// [`ByteSource`] over decoded WAV data, for driving a pull session from
/// a file. Each read yields 100ms of PCM; an exhausted source returns
/// empty reads.
pub struct WavByteSource {
    pcm: Vec<u8>,
    position: usize,
    chunk_bytes: usize,
}

impl WavByteSource {
    /// Decodes the reader up front; the source is then purely in-memory.
    pub fn from_reader(reader: impl Read, target: &AudioFormat) -> Result<Self> {
        let pcm = decode_to_pcm(reader, target)?;
        let chunk_bytes = (target.sample_rate as usize / 10) * 2;
        Ok(Self {
            pcm,
            position: 0,
            chunk_bytes: chunk_bytes.max(2),
        })
    }

    /// Total decoded PCM length in bytes.
    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    /// Returns true when the decoded stream is empty.
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}

impl ByteSource for WavByteSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        if self.position >= self.pcm.len() {
            return Ok(Vec::new());
        }
        let end = std::cmp::min(self.position + self.chunk_bytes, self.pcm.len());
        let chunk = self.pcm[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }
}
