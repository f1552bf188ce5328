//! WAV file recorder
//!
//! Writes the engine's stereo output to a 32-bit float WAV file.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const CHANNELS: u16 = 2;

/// Stereo WAV recorder
pub struct Recorder {
    writer: WavWriter<BufWriter<File>>,
    sample_rate: u32,
    frames_written: u64,
}

impl Recorder {
    /// Create a recorder writing to `path`
    pub fn new(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: CHANNELS,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer,
            sample_rate,
            frames_written: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stereo frames written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Get the duration recorded in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames_written as f64 / self.sample_rate as f64
    }

    /// Write one left/right frame
    pub fn write_frame(&mut self, frame: [f64; 2]) -> Result<()> {
        for sample in frame {
            self.writer
                .write_sample(sample as f32)
                .context("failed to write sample")?;
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Write interleaved left/right samples. A trailing odd sample is dropped.
    pub fn write_buffer(&mut self, buffer: &[f32]) -> Result<()> {
        for pair in buffer.chunks_exact(CHANNELS as usize) {
            for &sample in pair {
                self.writer
                    .write_sample(sample)
                    .context("failed to write sample")?;
            }
            self.frames_written += 1;
        }
        Ok(())
    }

    /// Finalize the WAV file
    ///
    /// This must be called to properly close the file and write the header.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize().context("failed to finalize WAV file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_recorder_creation() {
        let file = NamedTempFile::new().unwrap();
        let recorder = Recorder::new(file.path(), 44100).unwrap();

        assert_eq!(recorder.sample_rate(), 44100);
        assert_eq!(recorder.frames_written(), 0);
        assert_eq!(recorder.duration_secs(), 0.0);
    }

    #[test]
    fn test_write_buffer_counts_frames() {
        let file = NamedTempFile::new().unwrap();
        let mut recorder = Recorder::new(file.path(), 44100).unwrap();

        recorder.write_buffer(&[0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        assert_eq!(recorder.frames_written(), 2);
    }

    #[test]
    fn test_recorder_duration() {
        let file = NamedTempFile::new().unwrap();
        let mut recorder = Recorder::new(file.path(), 44100).unwrap();

        for _ in 0..44100 {
            recorder.write_frame([0.0, 0.0]).unwrap();
        }

        assert!((recorder.duration_secs() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_recorder_produces_valid_wav() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        {
            let mut recorder = Recorder::new(&path, 48000).unwrap();
            for i in 0..1000 {
                let s = (i as f64 / 1000.0 * std::f64::consts::TAU).sin();
                recorder.write_frame([s, -s]).unwrap();
            }
            recorder.finalize().unwrap();
        }

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, SampleFormat::Float);

        let samples: Vec<f32> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 2000);
        assert_eq!(samples[2], -samples[3]);
    }
}
