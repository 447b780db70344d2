//! Audio decoding helpers for the batch path.

pub mod wav;

pub use wav::{WavByteSource, decode_to_pcm};
