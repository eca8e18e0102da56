/// Per-item decoder exposed to compositors.
pub mod item;
/// Decoder configuration.
pub mod opts;
/// Reader/queue state machine shared by the video and audio tracks.
pub mod pipeline;
