//! Configuration store collaborator.
//!
//! The facade keeps three small metadata areas outside the day files: the
//! event registry (id to name), per-event tag metadata used by displays, and
//! event ids declared by equipment. Sample data is never stored here.

use crate::format::{names_match, Tag};
use std::collections::BTreeMap;

/// Tag list of one event as recorded for displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMetadata {
    /// Event id.
    pub event_id: u32,
    /// Event name as passed to the facade.
    pub event_name: String,
    /// Tags in definition order.
    pub tags: Vec<Tag>,
}

/// Metadata areas of the configuration store used for name resolution.
pub trait ConfigStore {
    /// All registry entries. Registry names store `/` as `:`.
    fn event_registry(&self) -> Vec<(u32, String)>;

    /// Adds or replaces a registry entry.
    fn register_event(&mut self, event_id: u32, name: &str);

    /// Event id declared by the equipment named `name`, if any.
    fn equipment_event_id(&self, name: &str) -> Option<u32>;

    /// Tag metadata of every event.
    fn tag_metadata(&self) -> Vec<TagMetadata>;

    /// Adds or replaces the tag metadata of `metadata.event_id`.
    fn set_tag_metadata(&mut self, metadata: TagMetadata);

    /// Registry name of `event_id`.
    fn registry_name(&self, event_id: u32) -> Option<String> {
        self.event_registry()
            .into_iter()
            .find(|(id, _)| *id == event_id)
            .map(|(_, name)| name)
    }

    /// Tag metadata of the event named `event_name`, ignoring ASCII case.
    fn tag_metadata_for(&self, event_name: &str) -> Option<TagMetadata> {
        self.tag_metadata()
            .into_iter()
            .find(|meta| names_match(&meta.event_name, event_name))
    }
}

/// In-memory [`ConfigStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    registry: BTreeMap<u32, String>,
    equipment: BTreeMap<String, u32>,
    tags: BTreeMap<u32, TagMetadata>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the event id used by an equipment.
    pub fn set_equipment_event_id(&mut self, name: impl Into<String>, event_id: u32) {
        self.equipment.insert(name.into(), event_id);
    }

    /// Removes all tag metadata.
    pub fn clear_tag_metadata(&mut self) {
        self.tags.clear();
    }
}

impl ConfigStore for MemoryConfigStore {
    fn event_registry(&self) -> Vec<(u32, String)> {
        self.registry
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }

    fn register_event(&mut self, event_id: u32, name: &str) {
        self.registry.insert(event_id, name.to_string());
    }

    fn equipment_event_id(&self, name: &str) -> Option<u32> {
        self.equipment
            .iter()
            .find(|(equipment, _)| names_match(equipment, name))
            .map(|(_, id)| *id)
    }

    fn tag_metadata(&self) -> Vec<TagMetadata> {
        self.tags.values().cloned().collect()
    }

    fn set_tag_metadata(&mut self, metadata: TagMetadata) {
        self.tags.insert(metadata.event_id, metadata);
    }
}
