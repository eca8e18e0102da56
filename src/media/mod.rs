/// Backends implementing [`track::MediaBackend`].
pub mod backend;
/// Decoded units and the shared handles given to consumers.
pub mod handle;
/// Bounded per-track look-ahead queue.
pub mod queue;
/// Track reader capability and reader bookkeeping.
pub mod track;
