//! Error handling for Sonodream
//!
//! Every fallible operation in the crate returns [`DreamError`]. Errors carry
//! a stable code and recovery suggestions so the CLI can print something
//! actionable instead of a bare message.

use thiserror::Error;

/// Result type alias for Sonodream operations
pub type Result<T> = std::result::Result<T, DreamError>;

/// Main error type for Sonodream operations
#[derive(Error, Debug)]
pub enum DreamError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Signal Errors
    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Degenerate input: {reason}")]
    DegenerateInput { reason: String },

    // Model Errors
    #[error("Failed to load model parameters from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("Incompatible model parameters: {reason}")]
    IncompatibleModel { reason: String },

    #[error("Unknown layer '{layer}' (available: {})", .available.join(", "))]
    UnknownLayer {
        layer: String,
        available: Vec<String>,
    },

    #[error("Channel {channel} out of range for layer '{layer}' ({channels} channels)")]
    ChannelOutOfRange {
        layer: String,
        channel: usize,
        channels: usize,
    },

    // Optimisation Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DreamError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            DreamError::FileNotFound { .. } => "FILE_NOT_FOUND",
            DreamError::InvalidAudio { .. } => "INVALID_AUDIO",
            DreamError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            DreamError::EmptyAudio => "EMPTY_AUDIO",
            DreamError::DegenerateInput { .. } => "DEGENERATE_INPUT",
            DreamError::ModelLoad { .. } => "MODEL_LOAD",
            DreamError::IncompatibleModel { .. } => "INCOMPATIBLE_MODEL",
            DreamError::UnknownLayer { .. } => "UNKNOWN_LAYER",
            DreamError::ChannelOutOfRange { .. } => "CHANNEL_OUT_OF_RANGE",
            DreamError::InvalidConfig { .. } => "INVALID_CONFIG",
            DreamError::InvalidGeometry { .. } => "INVALID_GEOMETRY",
            DreamError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            DreamError::Io(_) => "IO_ERROR",
            DreamError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable by changing the input or settings
    ///
    /// Model load failures are fatal: the run aborts with no partial recovery.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DreamError::FileNotFound { .. } => true,
            DreamError::InvalidAudio { .. } => true,
            DreamError::UnsupportedFormat { .. } => true,
            DreamError::DegenerateInput { .. } => true,
            DreamError::UnknownLayer { .. } => true,
            DreamError::ChannelOutOfRange { .. } => true,
            DreamError::InvalidConfig { .. } => true,
            DreamError::InvalidGeometry { .. } => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DreamError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            DreamError::InvalidAudio { .. } => vec![
                "Try converting the file to WAV format first",
                "The file may be corrupted - try re-exporting from source",
            ],
            DreamError::UnsupportedFormat { .. } => vec![
                "Convert to 16/24/32-bit integer or 32-bit float WAV",
            ],
            DreamError::EmptyAudio | DreamError::DegenerateInput { .. } => vec![
                "The input appears to be silent",
                "Use a clip that contains audible content",
            ],
            DreamError::ModelLoad { .. } | DreamError::IncompatibleModel { .. } => vec![
                "Check the model parameter file path",
                "Regenerate the parameter file with a matching architecture",
            ],
            DreamError::UnknownLayer { .. } => vec![
                "Run with --verbose to list the dreamable layer names",
                "Only residual blocks can be dreamed on",
            ],
            DreamError::ChannelOutOfRange { .. } => vec![
                "Pick a channel index smaller than the layer width",
            ],
            DreamError::InvalidGeometry { .. } => vec![
                "Use fewer octaves or a smaller octave scale",
                "Use a longer audio clip",
            ],
            _ => vec![],
        }
    }
}
