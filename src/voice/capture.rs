//! Audio capture from microphone
//!
//! The microphone is the one shared hardware resource of the engine. Each
//! holder (wake word listener or recording session) opens its own
//! [`MicStream`]; dropping the stream releases the device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Pause/resume control over a live input stream
pub trait StreamControl {
    /// Stop delivering audio without releasing the device
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to pause
    fn pause(&self) -> Result<()>;

    /// Resume delivering audio
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to play
    fn play(&self) -> Result<()>;
}

/// One exclusive microphone stream delivering mono `f32` chunks
pub struct MicStream {
    chunks: mpsc::UnboundedReceiver<Vec<f32>>,
    control: Box<dyn StreamControl>,
    sample_rate: u32,
    suspended: bool,
}

impl MicStream {
    /// Wrap a chunk receiver and its backend control
    #[must_use]
    pub fn new(
        chunks: mpsc::UnboundedReceiver<Vec<f32>>,
        control: Box<dyn StreamControl>,
        sample_rate: u32,
    ) -> Self {
        Self {
            chunks,
            control,
            sample_rate,
            suspended: false,
        }
    }

    /// Wait for the next chunk of samples
    ///
    /// Returns `None` once the backend has gone away.
    pub async fn next_chunk(&mut self) -> Option<Vec<f32>> {
        self.chunks.recv().await
    }

    /// Take every chunk buffered so far without waiting
    pub fn drain(&mut self) -> Vec<f32> {
        let mut samples = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            samples.extend_from_slice(&chunk);
        }
        samples
    }

    /// Pause the stream, keeping the device attached
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to pause
    pub fn suspend(&mut self) -> Result<()> {
        if !self.suspended {
            self.control.pause()?;
            self.suspended = true;
            tracing::debug!("microphone stream suspended");
        }
        Ok(())
    }

    /// Resume a suspended stream, discarding audio buffered before the pause
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to play
    pub fn resume(&mut self) -> Result<()> {
        if self.suspended {
            let _ = self.drain();
            self.control.play()?;
            self.suspended = false;
            tracing::debug!("microphone stream resumed");
        }
        Ok(())
    }

    /// Whether the stream is paused
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MicStream {
    fn drop(&mut self) {
        tracing::debug!("microphone stream released");
    }
}

/// Source of exclusive microphone streams
pub trait Microphone {
    /// Acquire the microphone
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] if access is denied or no device exists,
    /// [`Error::Audio`] for other backend failures
    fn open(&self) -> Result<MicStream>;
}

/// Microphone backed by the default `cpal` input device
pub struct CpalMicrophone {
    config: StreamConfig,
}

impl CpalMicrophone {
    /// Probe the default input device for a 16kHz mono configuration
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Permission("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self { config })
    }
}

impl Microphone for CpalMicrophone {
    fn open(&self) -> Result<MicStream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Permission("no input device".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Receiver gone means the holder released the stream
                    let _ = tx.send(data.to_vec());
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => Error::Permission(e.to_string()),
                other => Error::Audio(other.to_string()),
            })?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!("audio capture started");
        Ok(MicStream::new(rx, Box::new(CpalStream(stream)), SAMPLE_RATE))
    }
}

struct CpalStream(cpal::Stream);

impl StreamControl for CpalStream {
    fn pause(&self) -> Result<()> {
        self.0.pause().map_err(|e| Error::Audio(e.to_string()))
    }

    fn play(&self) -> Result<()> {
        self.0.play().map_err(|e| Error::Audio(e.to_string()))
    }
}

/// Convert f32 samples to 16-bit PCM, clamping to the valid range
#[must_use]
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            #[allow(clippy::cast_possible_truncation)]
            let pcm = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            pcm
        })
        .collect()
}

/// Convert f32 samples to WAV bytes for upload
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for sample in to_pcm16(samples) {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
