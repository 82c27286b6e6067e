//! Compiled keyword model engine

use async_trait::async_trait;
use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};

use super::capture::SAMPLE_RATE;
use super::wake_word::KeywordSpotter;
use crate::config::WakeConfig;
use crate::{Error, Result};

/// Detection score threshold
const THRESHOLD: f32 = 0.45;

/// Keyword spotter backed by a rustpotter model file
pub struct RustpotterSpotter {
    detector: Rustpotter,
}

impl RustpotterSpotter {
    /// Load the keyword model named in the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::WakeWord`] if the model path is missing or unreadable
    pub fn from_config(config: &WakeConfig) -> Result<Self> {
        let keyword_path = config
            .keyword_path
            .as_ref()
            .ok_or_else(|| Error::WakeWord("keyword model path not configured".to_string()))?;

        if !keyword_path.exists() {
            return Err(Error::WakeWord(format!(
                "keyword model not found: {}",
                keyword_path.display()
            )));
        }

        let path = keyword_path
            .to_str()
            .ok_or_else(|| Error::WakeWord("keyword model path is not valid UTF-8".to_string()))?;

        let mut rustpotter_config = RustpotterConfig::default();
        rustpotter_config.fmt.sample_rate = SAMPLE_RATE as usize;
        rustpotter_config.fmt.channels = 1;
        rustpotter_config.fmt.sample_format = SampleFormat::F32;
        rustpotter_config.detector.threshold = THRESHOLD;

        let mut detector = Rustpotter::new(&rustpotter_config)
            .map_err(|e| Error::WakeWord(format!("failed to create detector: {e}")))?;
        detector
            .add_wakeword_from_file("wake", path)
            .map_err(|e| Error::WakeWord(format!("failed to load keyword model: {e}")))?;

        tracing::info!(path, "keyword model loaded");
        Ok(Self { detector })
    }
}

#[async_trait(?Send)]
impl KeywordSpotter for RustpotterSpotter {
    fn frame_length(&self) -> usize {
        self.detector.get_samples_per_frame()
    }

    async fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        let samples: Vec<f32> = frame.iter().map(|&s| f32::from(s) / 32768.0).collect();
        Ok(self.detector.process_f32(&samples).map(|detection| {
            tracing::info!(score = detection.score, "keyword detected");
            0
        }))
    }

    fn reset(&mut self) {
        self.detector.reset();
    }
}
