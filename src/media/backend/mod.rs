/// System `ffmpeg` backend.
pub mod ffmpeg;
/// Deterministic in-memory backend.
pub mod synthetic;
