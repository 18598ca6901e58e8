//! CLI Command Implementations
//!
//! Implements the actual logic behind the command line.

use log::info;

use super::Cli;
use crate::dream::DeepDream;
use crate::error::Result;
use crate::neural::ResidualClassifier;
use crate::pipeline::{DreamPipeline, OutputSettings, ProcessedFile};
use crate::spectral::{CodecConfig, InverseMode};

/// Load the model, dream on the input file, and write the result.
pub fn dream(cli: &Cli) -> Result<Vec<ProcessedFile>> {
    let config = cli.dream_config()?;

    info!("Loading classifier: {}", cli.model_path.display());
    let classifier = ResidualClassifier::load(&cli.model_path)?;

    // Unknown layers are rejected here, listing what is available
    let mut dream = DeepDream::new(&classifier, config)?;

    if cli.verbose {
        let names: Vec<String> = dream
            .available_layers()
            .into_iter()
            .map(|layer| format!("{} ({} channels)", layer.name, layer.channels))
            .collect();
        println!("Available layer names: {}", names.join(", "));
    }

    let codec = CodecConfig {
        inverse_mode: if cli.exact_inverse {
            InverseMode::Exact
        } else {
            InverseMode::Perceptual
        },
        ..CodecConfig::default()
    };
    let output = OutputSettings {
        output_dir: cli.output_dir.clone(),
        base_name: cli.base_name.clone(),
        ..OutputSettings::default()
    };
    let pipeline = DreamPipeline::new(codec, output)?;

    let processed = pipeline.run(&mut dream, std::slice::from_ref(&cli.input_path))?;
    for file in &processed {
        match file.final_objective {
            Some(objective) => println!(
                "{} -> {} ({:.2}s, final objective {:.4})",
                file.input.display(),
                file.output.display(),
                file.duration_secs,
                objective
            ),
            None => println!(
                "{} -> {} ({:.2}s)",
                file.input.display(),
                file.output.display(),
                file.duration_secs
            ),
        }
    }

    Ok(processed)
}
