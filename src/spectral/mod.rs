//! Spectral representation of audio
//!
//! - `stft`: Hann-windowed STFT and its overlap-add inverse
//! - `codec`: waveform <-> bounded two-channel magnitude/phase tensor
//! - `crop`: standalone random fixed-width time crop utility; the dream
//!   pipeline does not crop

pub mod codec;
pub mod crop;
pub mod stft;

pub use codec::{
    CodecConfig, EncodedSpectrogram, InverseMode, InversionContext, SpectralCodec,
    CHANNEL_RANGE, MAGNITUDE_NONLINEARITY,
};
pub use crop::RandomCrop;
pub use stft::{ComplexSpectrogram, Stft};
