use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::foundation::error::{ClipfeedError, ClipfeedResult};
use crate::scene::model::{CompositionDef, CompositionItem};

/// Composition boundary object: the JSON-facing list of items to decode.
#[derive(Debug, Clone)]
pub struct Composition {
    def: CompositionDef,
}

impl Composition {
    /// Build a composition from a duration and items.
    pub fn new(duration: f64, items: Vec<CompositionItem>) -> Self {
        Self {
            def: CompositionDef { duration, items },
        }
    }

    /// Parse a composition from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> ClipfeedResult<Self> {
        let def: CompositionDef = serde_json::from_reader(r)
            .map_err(|e| ClipfeedError::serde(format!("parse composition JSON: {e}")))?;
        Ok(Self { def })
    }

    /// Parse a composition from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> ClipfeedResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            ClipfeedError::validation(format!("open composition JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> ClipfeedResult<String> {
        serde_json::to_string_pretty(&self.def)
            .map_err(|e| ClipfeedError::serde(format!("serialize composition JSON: {e}")))
    }

    /// Validate durations, rates and item identifiers.
    pub fn validate(&self) -> ClipfeedResult<()> {
        if !self.def.duration.is_finite() || self.def.duration <= 0.0 {
            return Err(ClipfeedError::validation(
                "composition duration must be finite and > 0",
            ));
        }
        let mut seen = BTreeSet::new();
        for item in &self.def.items {
            validate_item(item)?;
            if !seen.insert(item.id.as_str()) {
                return Err(ClipfeedError::validation(format!(
                    "duplicate item id '{}'",
                    item.id
                )));
            }
        }
        Ok(())
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.def.duration
    }

    /// Items in declaration order.
    pub fn items(&self) -> &[CompositionItem] {
        &self.def.items
    }

    /// Look up an item by id.
    pub fn item(&self, id: &str) -> Option<&CompositionItem> {
        self.def.items.iter().find(|item| item.id == id)
    }
}

/// Validate a single item.
pub fn validate_item(item: &CompositionItem) -> ClipfeedResult<()> {
    if item.id.is_empty() {
        return Err(ClipfeedError::validation("item id must be non-empty"));
    }
    if item.path.is_empty() {
        return Err(ClipfeedError::validation(format!(
            "item '{}': path must be non-empty",
            item.id
        )));
    }
    if !item.duration.is_finite() || item.duration <= 0.0 {
        return Err(ClipfeedError::validation(format!(
            "item '{}': duration must be finite and > 0",
            item.id
        )));
    }
    if !item.playback_rate.is_finite() || item.playback_rate <= 0.0 {
        return Err(ClipfeedError::validation(format!(
            "item '{}': playback_rate must be finite and > 0",
            item.id
        )));
    }
    if !item.start_time.is_finite() || item.start_time < 0.0 {
        return Err(ClipfeedError::validation(format!(
            "item '{}': start_time must be finite and >= 0",
            item.id
        )));
    }
    if !item.composition_start_time.is_finite() {
        return Err(ClipfeedError::validation(format!(
            "item '{}': composition_start_time must be finite",
            item.id
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/scene/composition.rs"]
mod tests;
