/// Composition loading and validation.
pub mod composition;
/// Serializable item definitions and item time mapping.
pub mod model;
