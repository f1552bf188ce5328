//! Real-time audio playback using cpal

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use super::Engine;
use crate::viz::SampleBuffer;

/// Real-time audio player. The engine is moved into the output callback.
pub struct Player {
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl Player {
    pub fn new() -> Self {
        Self {
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Find an output device by name substring, or the default device
    pub fn open_device(name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();
        match name {
            Some(name) => host
                .output_devices()
                .context("failed to list output devices")?
                .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
                .ok_or_else(|| anyhow!("Output device '{}' not found", name)),
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("No output device available")),
        }
    }

    /// Sample rate the device will run at
    pub fn device_sample_rate(device: &Device) -> Result<u32> {
        Ok(device.default_output_config()?.sample_rate().0)
    }

    /// Start playing, optionally copying the output into a scope buffer
    pub fn start(
        &mut self,
        device: &Device,
        engine: Engine,
        viz_buffer: Option<Arc<Mutex<SampleBuffer>>>,
    ) -> Result<()> {
        let config = device.default_output_config()?;
        let sample_format = config.sample_format();
        let stream_config: StreamConfig = config.into();

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = stream_config.sample_rate.0,
            channels = stream_config.channels,
            "opening output stream"
        );

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(device, &stream_config, engine, running, viz_buffer)?,
            SampleFormat::I16 => build_stream::<i16>(device, &stream_config, engine, running, viz_buffer)?,
            SampleFormat::U16 => build_stream::<u16>(device, &stream_config, engine, running, viz_buffer)?,
            _ => return Err(anyhow!("Unsupported sample format")),
        };

        stream.play()?;
        self.stream = Some(stream);

        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stream = None;
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

fn build_stream<T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    mut engine: Engine,
    running: Arc<AtomicBool>,
    viz_buffer: Option<Arc<Mutex<SampleBuffer>>>,
) -> Result<Stream> {
    let channels = config.channels as usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if !running.load(Ordering::SeqCst) {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0f32);
                }
                return;
            }

            // A busy scope skips this callback rather than blocking audio
            let mut viz = viz_buffer.as_ref().and_then(|v| v.try_lock().ok());

            for frame in data.chunks_mut(channels) {
                let [l, r] = engine.process();
                let (l, r) = (l as f32, r as f32);

                if let Some(buf) = viz.as_mut() {
                    buf.push((l + r) * 0.5);
                }

                if channels == 1 {
                    frame[0] = T::from_sample((l + r) * 0.5);
                    continue;
                }
                for (i, sample) in frame.iter_mut().enumerate() {
                    *sample = T::from_sample(if i % 2 == 0 { l } else { r });
                }
            }
        },
        |err| {
            error!("audio stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}

/// Get the default output device name
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.name().ok())
}

/// List all available output devices
pub fn list_output_devices() -> Vec<(String, StreamConfig)> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let (Ok(name), Ok(config)) = (device.name(), device.default_output_config()) {
                devices.push((name, config.into()));
            }
        }
    }

    devices
}
