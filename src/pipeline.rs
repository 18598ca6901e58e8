//! End-to-end dream pipeline
//!
//! A plain sequential chain over one or more audio files:
//!
//! ```text
//! load (mono, resampled) -> codec forward -> deep dream -> codec inverse -> save
//! ```
//!
//! Outputs are written as `{base_name}_{index}.wav` into the output
//! directory, `index` being the input's position in the list.

use std::path::{Path, PathBuf};

use log::info;

use crate::dream::{DeepDream, IterationRecord};
use crate::engine::{
    load_audio, output_path, save_audio, ExportFormat, Waveform, SILENCE_THRESHOLD_DB,
};
use crate::error::{DreamError, Result};
use crate::neural::Classifier;
use crate::spectral::{CodecConfig, SpectralCodec};

/// Where and how results are written
#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub output_dir: PathBuf,
    pub base_name: String,
    pub format: ExportFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            base_name: "audio".to_string(),
            format: ExportFormat::default(),
        }
    }
}

/// Result of dreaming one waveform
#[derive(Debug, Clone)]
pub struct DreamedAudio {
    pub waveform: Waveform,
    pub history: Vec<IterationRecord>,
}

/// Summary of one processed file
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub duration_secs: f64,
    /// Objective of the last ascent step, if any step ran
    pub final_objective: Option<f32>,
}

/// Sequential load, encode, dream, decode, save chain
#[derive(Debug)]
pub struct DreamPipeline {
    codec: SpectralCodec,
    output: OutputSettings,
}

impl DreamPipeline {
    pub fn new(codec: CodecConfig, output: OutputSettings) -> Result<Self> {
        Ok(Self {
            codec: SpectralCodec::new(codec)?,
            output,
        })
    }

    pub fn codec(&self) -> &SpectralCodec {
        &self.codec
    }

    pub fn output_settings(&self) -> &OutputSettings {
        &self.output
    }

    /// Encode, dream, and decode one waveform in memory
    ///
    /// # Errors
    /// * `DegenerateInput` - If the clip is below the silence threshold
    pub fn dream_waveform<C: Classifier + ?Sized>(
        &self,
        dream: &mut DeepDream<'_, C>,
        wave: &Waveform,
    ) -> Result<DreamedAudio> {
        if wave.is_silent() {
            return Err(DreamError::DegenerateInput {
                reason: format!(
                    "input RMS {:.1} dBFS is below the {} dBFS silence threshold",
                    wave.rms_db(),
                    SILENCE_THRESHOLD_DB
                ),
            });
        }

        let encoded = self.codec.forward(wave)?;
        let outcome = dream.run_traced(&encoded.representation)?;
        let waveform =
            self.codec
                .inverse(&outcome.representation, &encoded.context, wave.sample_rate())?;
        Ok(DreamedAudio {
            waveform,
            history: outcome.history,
        })
    }

    /// Process every input file in order
    ///
    /// Stops at the first failure; files written before it are kept.
    pub fn run<C: Classifier + ?Sized>(
        &self,
        dream: &mut DeepDream<'_, C>,
        inputs: &[PathBuf],
    ) -> Result<Vec<ProcessedFile>> {
        let mut processed = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            processed.push(self.process_file(dream, input, index)?);
        }
        Ok(processed)
    }

    fn process_file<C: Classifier + ?Sized>(
        &self,
        dream: &mut DeepDream<'_, C>,
        input: &Path,
        index: usize,
    ) -> Result<ProcessedFile> {
        info!("Processing {}", input.display());
        let wave = load_audio(input, self.codec.config().sample_rate)?;
        let dreamed = self.dream_waveform(dream, &wave)?;

        let output = output_path(&self.output.output_dir, &self.output.base_name, index);
        save_audio(&dreamed.waveform, &output, &self.output.format)?;
        info!("Wrote {}", output.display());

        Ok(ProcessedFile {
            input: input.to_path_buf(),
            output,
            duration_secs: dreamed.waveform.duration_secs(),
            final_objective: dreamed.history.last().map(|record| record.objective),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dream::DreamConfig;
    use crate::engine::generate_test_tone;
    use crate::neural::TileMeanClassifier;
    use crate::spectral::InverseMode;

    fn pass_through_config() -> DreamConfig {
        DreamConfig {
            block_name: TileMeanClassifier::LAYER.to_string(),
            channel_index: 0,
            number_of_iterations: 0,
            n_octaves: 2,
            seed: Some(1),
            ..DreamConfig::default()
        }
    }

    #[test]
    fn test_pass_through_round_trip_with_exact_inverse() {
        let classifier = TileMeanClassifier::new(2);
        let mut dream = DeepDream::new(&classifier, pass_through_config()).unwrap();
        let codec = CodecConfig {
            inverse_mode: InverseMode::Exact,
            ..CodecConfig::default()
        };
        let pipeline = DreamPipeline::new(codec, OutputSettings::default()).unwrap();
        let wave = generate_test_tone(440.0, 0.5, 0.25, 16000).unwrap();

        let dreamed = pipeline.dream_waveform(&mut dream, &wave).unwrap();
        assert_eq!(dreamed.waveform.len(), wave.len());
        let max_err = wave
            .samples()
            .iter()
            .zip(dreamed.waveform.samples())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-2, "max error {}", max_err);
    }

    #[test]
    fn test_near_silent_input_is_degenerate() {
        let classifier = TileMeanClassifier::new(2);
        let mut dream = DeepDream::new(&classifier, pass_through_config()).unwrap();
        let pipeline = DreamPipeline::new(CodecConfig::default(), OutputSettings::default()).unwrap();

        // -100 dBFS peak: non-zero, so the codec alone would accept it
        let hiss = generate_test_tone(440.0, 1e-5, 0.25, 16000).unwrap();
        assert!(hiss.peak() > 0.0);
        assert!(matches!(
            pipeline.dream_waveform(&mut dream, &hiss),
            Err(DreamError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn test_missing_input_stops_run() {
        let classifier = TileMeanClassifier::new(2);
        let mut dream = DeepDream::new(&classifier, pass_through_config()).unwrap();
        let pipeline = DreamPipeline::new(CodecConfig::default(), OutputSettings::default()).unwrap();
        let result = pipeline.run(&mut dream, &[PathBuf::from("/nonexistent/input.wav")]);
        assert!(result.is_err());
    }
}
