/// Offline export driver over a fixed frame schedule.
pub mod export;
/// Per-composition extractor holding one item decoder per item.
pub mod extractor;
/// Additive mixing of per-item audio.
pub mod mix;
