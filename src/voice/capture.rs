//! Audio capture from microphone

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, Host, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedStreamConfigRange,
};

use super::frame::AudioFrame;
use super::recorder::{AudioInput, ErrorCallback, FrameCallback};
use super::resample::StreamResampler;
use super::vad::VadConfig;
use crate::{Error, Result};

/// Opens the system input device through `cpal`
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    device_name: Option<String>,
}

impl CpalInput {
    /// Capture from the default input device
    #[must_use]
    pub const fn new() -> Self {
        Self { device_name: None }
    }

    /// Capture from the first input device whose name contains `name`
    ///
    /// Matching is case-insensitive. `None` selects the default device.
    #[must_use]
    pub const fn with_device(name: Option<String>) -> Self {
        Self { device_name: name }
    }

    fn select_device(&self, host: &Host) -> Result<Device> {
        let Some(wanted) = &self.device_name else {
            return host
                .default_input_device()
                .ok_or_else(|| Error::DeviceAccess("no input device available".to_string()));
        };

        let wanted = wanted.to_lowercase();
        host.input_devices()
            .map_err(|e| Error::DeviceAccess(e.to_string()))?
            .find(|d| {
                d.name()
                    .map(|n| n.to_lowercase().contains(&wanted))
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::DeviceAccess(format!("no input device matching \"{wanted}\"")))
    }
}

/// Live input stream; the device is released when this is dropped
pub struct InputStream {
    _stream: Stream,
    device: String,
}

impl Drop for InputStream {
    fn drop(&mut self) {
        tracing::debug!(device = %self.device, "audio capture stopped");
    }
}

impl AudioInput for CpalInput {
    type Stream = InputStream;

    fn open(
        &self,
        config: &VadConfig,
        on_frame: FrameCallback,
        on_error: ErrorCallback,
    ) -> Result<InputStream> {
        let host = cpal::default_host();
        let device = self.select_device(&host)?;
        let (stream_config, sample_format) = input_config(&device, config.sample_rate)?;
        let framer = DeviceFramer::new(config, stream_config.sample_rate.0, stream_config.channels)?;
        let name = device.name().unwrap_or_default();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(
                &device,
                &stream_config,
                framer,
                f32_to_i16,
                on_frame,
                on_error,
            ),
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, framer, |s| s, on_frame, on_error)
            }
            SampleFormat::U16 => build_stream::<u16>(
                &device,
                &stream_config,
                framer,
                u16_to_i16,
                on_frame,
                on_error,
            ),
            other => Err(Error::DeviceAccess(format!(
                "unsupported sample format: {other:?}"
            ))),
        }?;

        stream
            .play()
            .map_err(|e| Error::DeviceAccess(e.to_string()))?;

        tracing::debug!(
            device = %name,
            device_rate = stream_config.sample_rate.0,
            sample_rate = config.sample_rate,
            channels = stream_config.channels,
            format = ?sample_format,
            frame_samples = config.frame_samples(),
            "audio capture started"
        );

        Ok(InputStream {
            _stream: stream,
            device: name,
        })
    }
}

/// Pick a stream config at `rate`, falling back to the device default
///
/// Prefers the fewest channels that support the rate; extra channels are
/// down-mixed by the framer.
fn input_config(device: &Device, rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let wanted = SampleRate(rate);
    let native = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceAccess(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= wanted && c.max_sample_rate() >= wanted)
        .min_by_key(SupportedStreamConfigRange::channels);

    if let Some(supported) = native {
        let format = supported.sample_format();
        return Ok((supported.with_sample_rate(wanted).config(), format));
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| Error::DeviceAccess(e.to_string()))?;
    tracing::info!(
        device_rate = fallback.sample_rate().0,
        vad_rate = rate,
        "input device does not run at the VAD rate, resampling"
    );
    Ok((fallback.config(), fallback.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut framer: DeviceFramer,
    convert: fn(T) -> i16,
    mut on_frame: FrameCallback,
    on_error: ErrorCallback,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
{
    let on_error = Arc::new(Mutex::new(on_error));
    let framer_error = Arc::clone(&on_error);
    let mut failed = false;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if failed {
                    return;
                }
                if let Err(e) = framer.push(data, convert, &mut on_frame) {
                    failed = true;
                    tracing::error!(error = %e, "audio framing failed");
                    report(&framer_error, e.to_string());
                }
            },
            move |err| {
                tracing::error!(error = %err, "audio capture error");
                report(&on_error, err.to_string());
            },
            None,
        )
        .map_err(|e| Error::DeviceAccess(e.to_string()))
}

fn report(on_error: &Mutex<ErrorCallback>, reason: String) {
    if let Ok(mut callback) = on_error.lock() {
        callback(reason);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

#[allow(clippy::cast_possible_truncation)]
fn u16_to_i16(sample: u16) -> i16 {
    (i32::from(sample) - 32768) as i16
}

/// Re-frames device buffers into fixed-size mono PCM frames
///
/// Devices deliver buffers of whatever size suits the backend, interleaved
/// across channels. Channels are averaged and the result is cut into frames
/// of exactly `frame_samples` samples; a partial frame waits for the next
/// buffer.
#[derive(Debug)]
pub struct FrameChunker {
    frame_samples: usize,
    channels: usize,
    pending: Vec<i16>,
}

impl FrameChunker {
    /// Create a chunker for the given frame size and channel count
    #[must_use]
    pub fn new(frame_samples: usize, channels: usize) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(frame_samples),
        }
    }

    /// Feed interleaved device samples, emitting every completed frame
    pub fn push<T, F>(&mut self, data: &[T], convert: fn(T) -> i16, mut emit: F)
    where
        T: Copy,
        F: FnMut(AudioFrame),
    {
        for group in data.chunks(self.channels) {
            let sum: i32 = group.iter().map(|&s| i32::from(convert(s))).sum();
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let mono = (sum / group.len() as i32) as i16;
            self.pending.push(mono);

            if self.pending.len() == self.frame_samples {
                emit(AudioFrame::from_samples(&self.pending));
                self.pending.clear();
            }
        }
    }

    /// Samples waiting for the next frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Turns device buffers into VAD frames
///
/// When the device runs at the VAD rate this is a plain [`FrameChunker`].
/// Otherwise channels are averaged first, the mono signal is resampled to
/// the VAD rate and the result is chunked.
pub struct DeviceFramer {
    chunker: FrameChunker,
    resampler: Option<StreamResampler>,
    channels: usize,
    mono: Vec<f32>,
}

impl DeviceFramer {
    /// Create a framer for a device running at `device_rate` with `channels`
    ///
    /// # Errors
    ///
    /// Returns error if a resampler is needed and can't be built
    pub fn new(config: &VadConfig, device_rate: u32, channels: u16) -> Result<Self> {
        let channels = usize::from(channels).max(1);

        if device_rate == config.sample_rate {
            return Ok(Self {
                chunker: FrameChunker::new(config.frame_samples(), channels),
                resampler: None,
                channels,
                mono: Vec::new(),
            });
        }

        Ok(Self {
            chunker: FrameChunker::new(config.frame_samples(), 1),
            resampler: Some(StreamResampler::new(device_rate, config.sample_rate)?),
            channels,
            mono: Vec::new(),
        })
    }

    /// Feed interleaved device samples, emitting every completed frame
    ///
    /// # Errors
    ///
    /// Returns error if resampling fails
    pub fn push<T, F>(&mut self, data: &[T], convert: fn(T) -> i16, mut emit: F) -> Result<()>
    where
        T: Copy,
        F: FnMut(AudioFrame),
    {
        let Some(resampler) = &mut self.resampler else {
            self.chunker.push(data, convert, emit);
            return Ok(());
        };

        self.mono.clear();
        self.mono.extend(data.chunks(self.channels).map(|group| {
            let sum: f32 = group.iter().map(|&s| f32::from(convert(s))).sum();
            #[allow(clippy::cast_precision_loss)]
            let mean = sum / group.len() as f32;
            mean / 32768.0
        }));

        let chunker = &mut self.chunker;
        resampler.push(&self.mono, |block| chunker.push(block, f32_to_i16, &mut emit))
    }
}

/// Names of the available input devices
///
/// # Errors
///
/// Returns error if devices cannot be enumerated
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::DeviceAccess(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    Ok(devices)
}

/// Name of the default input device, if any
#[must_use]
pub fn default_input_device() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}
