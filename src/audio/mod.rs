pub mod capture;
pub mod file;

pub use capture::{AudioFrame, CaptureConfig, CaptureSource, SilenceSource};
pub use file::{encode_wav, AudioFile, FileSource};
