//! Pitch generation and message composition.

pub mod composer;
pub mod prompt;
pub mod writer;

pub use composer::{MessageBody, SenderIdentity, compose};
pub use prompt::{PitchRequest, PitchText};
pub use writer::{GeneratedPitch, PitchWriter, WriterConfig};
