//! Name resolution facade.
//!
//! [`History`] is the API used by producers and displays. It maps event and
//! tag names to the numeric event ids of the [`HistoryStore`] through a
//! [`ConfigStore`], and caches what it resolved until
//! [`History::clear_cache`] is called.
//!
//! Event ids are resolved in order from:
//!
//! 1. the tag metadata area of the configuration store,
//! 2. the event registry, confirmed against the newest stored definition,
//! 3. the definition indexes of the day files themselves.

mod config_store;

pub use config_store::{ConfigStore, MemoryConfigStore, TagMetadata};

use crate::binned::BinnedResult;
use crate::error::{HistoryError, Result};
use crate::format::{names_match, Tag};
use crate::store::{HistoryStore, ReadRequest, Sample};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Event name that always maps to id 0.
pub const RUN_TRANSITIONS: &str = "Run transitions";

/// First id handed out to events without an equipment id.
pub const FIRST_FREE_EVENT_ID: u32 = 101;

/// Upper bound (exclusive) of allocated event ids.
pub const LAST_EVENT_ID: u32 = 65_000;

/// Sample capacity of the first attempt of a buffered read.
pub const INITIAL_READ_SAMPLES: usize = 1000;

/// A variable to read: element `index` of `tag` in event `event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarSpec {
    /// Event name.
    pub event: String,
    /// Tag name.
    pub tag: String,
    /// Array element.
    pub index: u32,
}

impl VarSpec {
    /// Creates a variable for element 0.
    pub fn new(event: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            tag: tag.into(),
            index: 0,
        }
    }

    /// Selects an array element.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }
}

/// History access by name.
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::facade::{History, MemoryConfigStore, VarSpec};
/// use alopex_hstore::format::{Tag, TypeCode};
/// use alopex_hstore::{HistoryConfig, HistoryStore};
///
/// let store = HistoryStore::open(HistoryConfig::new("/data/history"))?;
/// let mut history = History::new(store, MemoryConfigStore::new());
/// history.define_event("Temp", &[Tag::new("T", TypeCode::Float, 1)])?;
/// history.write_event("Temp", &21.5f32.to_le_bytes())?;
///
/// let results = history.read(0, 0, 0, &[VarSpec::new("Temp", "T")]);
/// ```
#[derive(Debug)]
pub struct History<C: ConfigStore = MemoryConfigStore> {
    store: HistoryStore,
    config_store: C,
    writer_ids: HashMap<String, u32>,
    events_cache: Option<Vec<String>>,
    tags_cache: HashMap<String, Vec<Tag>>,
    resolved: HashMap<(String, String), u32>,
}

impl<C: ConfigStore> History<C> {
    /// Creates a facade over `store` resolving names through `config_store`.
    pub fn new(store: HistoryStore, config_store: C) -> Self {
        Self {
            store,
            config_store,
            writer_ids: HashMap::new(),
            events_cache: None,
            tags_cache: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Underlying store, mutably.
    pub fn store_mut(&mut self) -> &mut HistoryStore {
        &mut self.store
    }

    /// Configuration store.
    pub fn config_store(&self) -> &C {
        &self.config_store
    }

    /// Configuration store, mutably.
    pub fn config_store_mut(&mut self) -> &mut C {
        &mut self.config_store
    }

    /// Defines an event by name and returns its id.
    ///
    /// The id comes from the event registry when the name is registered.
    /// Otherwise one is allocated: 0 for [`RUN_TRANSITIONS`], the equipment's
    /// declared id if it has one, else the first free id from
    /// [`FIRST_FREE_EVENT_ID`]. The tag list is merged into the tag metadata
    /// area before the definition is written.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::UndefinedEvent` if no id is free, and the
    /// errors of [`HistoryStore::define_event`].
    pub fn define_event(&mut self, name: &str, tags: &[Tag]) -> Result<u32> {
        let registry_name = name.replace('/', ":");
        let event_id = match self.registered_id(&registry_name) {
            Some(id) => id,
            None => {
                let id = self.allocate_id(name, &registry_name)?;
                self.config_store.register_event(id, &registry_name);
                debug!(name, event_id = id, "registered history event");
                id
            }
        };
        self.merge_tag_metadata(event_id, name, tags);
        self.store.define_event(event_id, name, tags)?;
        self.writer_ids.insert(name.to_string(), event_id);
        Ok(event_id)
    }

    /// Writes one sample of an event defined through this facade.
    pub fn write_event(&mut self, name: &str, payload: &[u8]) -> Result<()> {
        let event_id = *self
            .writer_ids
            .get(name)
            .ok_or_else(|| HistoryError::UndefinedEvent(name.to_string()))?;
        self.store.write_event(event_id, payload)
    }

    /// Names of all known events.
    pub fn get_events(&mut self) -> Vec<String> {
        if let Some(events) = &self.events_cache {
            return events.clone();
        }
        let mut names: Vec<String> = self
            .config_store
            .tag_metadata()
            .into_iter()
            .map(|meta| meta.event_name)
            .collect();
        if names.is_empty() {
            names = self
                .config_store
                .event_registry()
                .into_iter()
                .map(|(_, name)| name.replace(':', "/"))
                .collect();
        }
        let mut seen = HashSet::new();
        names.retain(|name| seen.insert(name.to_ascii_lowercase()));
        self.events_cache = Some(names.clone());
        names
    }

    /// Tags of an event, from the tag metadata area or else the newest
    /// stored definition.
    pub fn get_tags(&mut self, event: &str) -> Result<Vec<Tag>> {
        let key = event.to_ascii_lowercase();
        if let Some(tags) = self.tags_cache.get(&key) {
            return Ok(tags.clone());
        }
        let tags = match self.config_store.tag_metadata_for(event) {
            Some(meta) => meta.tags,
            None => {
                let event_id = self.get_event_id(0, event, None)?;
                self.store.enumerate_tags(0, event_id)?.tags
            }
        };
        self.tags_cache.insert(key, tags.clone());
        Ok(tags)
    }

    /// Resolves an event name, optionally requiring that it defines `tag`.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::UndefinedEvent` if every strategy fails.
    pub fn get_event_id(&mut self, time: u32, event: &str, tag: Option<&str>) -> Result<u32> {
        let key = (
            event.to_ascii_lowercase(),
            tag.unwrap_or_default().to_ascii_lowercase(),
        );
        if let Some(id) = self.resolved.get(&key) {
            return Ok(*id);
        }

        let event_id = match self.id_from_metadata(event, tag) {
            Some(id) => id,
            None => match self.id_from_registry(time, event, tag) {
                Some(id) => id,
                None => self.store.event_id_by_name(time, event)?,
            },
        };
        self.resolved.insert(key, event_id);
        Ok(event_id)
    }

    /// Reads each variable over `[start, end]`, one result per variable.
    pub fn read(
        &mut self,
        start: u32,
        end: u32,
        interval: u32,
        vars: &[VarSpec],
    ) -> Vec<Result<Vec<Sample>>> {
        vars.iter()
            .map(|var| {
                let request = self.request(start, end, interval, var)?;
                self.read_buffered(&request)
            })
            .collect()
    }

    /// Reads each variable into `num_bins` bins over `[start, end]`.
    pub fn read_binned(
        &mut self,
        start: u32,
        end: u32,
        num_bins: usize,
        vars: &[VarSpec],
    ) -> Vec<Result<BinnedResult>> {
        vars.iter()
            .map(|var| {
                let request = self.request(start, end, 0, var)?;
                self.store.read_binned(&request, num_bins)
            })
            .collect()
    }

    /// Forgets every cached name resolution, event list and tag list.
    pub fn clear_cache(&mut self) {
        self.events_cache = None;
        self.tags_cache.clear();
        self.resolved.clear();
    }

    fn registered_id(&self, registry_name: &str) -> Option<u32> {
        self.config_store
            .event_registry()
            .into_iter()
            .find(|(id, name)| *id != 0 && names_match(name, registry_name))
            .map(|(id, _)| id)
    }

    fn allocate_id(&self, name: &str, registry_name: &str) -> Result<u32> {
        if name == RUN_TRANSITIONS {
            return Ok(0);
        }
        if let Some(id) = self.config_store.equipment_event_id(name) {
            if let Some(existing) = self.config_store.registry_name(id) {
                if !names_match(&existing, registry_name) {
                    warn!(name, event_id = id, existing = %existing, "event id already registered to another event");
                }
            }
            return Ok(id);
        }
        let used: HashSet<u32> = self
            .config_store
            .event_registry()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        (FIRST_FREE_EVENT_ID..LAST_EVENT_ID)
            .find(|id| !used.contains(id))
            .ok_or_else(|| HistoryError::UndefinedEvent(format!("no free event id for {}", name)))
    }

    fn merge_tag_metadata(&mut self, event_id: u32, name: &str, tags: &[Tag]) {
        let mut meta = self
            .config_store
            .tag_metadata()
            .into_iter()
            .find(|meta| meta.event_id == event_id)
            .unwrap_or_else(|| TagMetadata {
                event_id,
                event_name: name.to_string(),
                tags: Vec::new(),
            });
        let mut changed = meta.tags.is_empty();
        for tag in tags {
            match meta.tags.iter_mut().find(|t| names_match(&t.name, &tag.name)) {
                Some(stored) if stored.type_code != tag.type_code || stored.count != tag.count => {
                    info!(event = name, tag = %tag.name, "tag definition changed");
                    *stored = tag.clone();
                    changed = true;
                }
                Some(_) => {}
                None => {
                    meta.tags.push(tag.clone());
                    changed = true;
                }
            }
        }
        if changed {
            self.config_store.set_tag_metadata(meta);
        }
    }

    fn id_from_metadata(&self, event: &str, tag: Option<&str>) -> Option<u32> {
        let meta = self.config_store.tag_metadata_for(event)?;
        let has_tag = tag.map_or(true, |tag| meta.tags.iter().any(|t| names_match(&t.name, tag)));
        (has_tag && meta.event_id > 0).then_some(meta.event_id)
    }

    fn id_from_registry(&self, time: u32, event: &str, tag: Option<&str>) -> Option<u32> {
        let registry_name = event.replace('/', ":");
        let (event_id, _) = self
            .config_store
            .event_registry()
            .into_iter()
            .find(|(id, name)| *id > 0 && names_match(name, &registry_name))?;
        let definition = self.store.enumerate_tags(time, event_id).ok()?;
        let has_tag = tag.map_or(true, |tag| definition.find_tag(tag).is_some());
        has_tag.then_some(event_id)
    }

    fn request(&mut self, start: u32, end: u32, interval: u32, var: &VarSpec) -> Result<ReadRequest> {
        let event_id = self.get_event_id(end, &var.event, Some(&var.tag))?;
        Ok(ReadRequest::new(event_id, var.tag.clone())
            .with_range(start, end)
            .with_interval(interval)
            .with_index(var.index))
    }

    /// Buffered read, retried with larger buffers while truncated.
    fn read_buffered(&self, request: &ReadRequest) -> Result<Vec<Sample>> {
        let mut samples = INITIAL_READ_SAMPLES;
        let mut data_bytes = INITIAL_READ_SAMPLES * std::mem::size_of::<f64>();
        loop {
            let mut times = vec![0u32; samples];
            let mut data = vec![0u8; data_bytes];
            match self.store.read_into(request, &mut times, &mut data) {
                Ok(summary) => {
                    return Ok(times
                        .into_iter()
                        .zip(summary.values(&data))
                        .map(|(time, value)| Sample { time, value })
                        .collect());
                }
                Err(HistoryError::Truncated {
                    required_samples,
                    required_data_bytes,
                    ..
                }) => {
                    samples = (samples * 2).max(required_samples);
                    data_bytes = (data_bytes * 2).max(required_data_bytes);
                    debug!(samples, data_bytes, "history read truncated, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::format::TypeCode;
    use crate::store::ManualClock;
    use tempfile::TempDir;

    const NOW: u32 = 1_700_000_000;

    fn history(dir: &TempDir, clock: &ManualClock) -> History {
        let store = HistoryStore::open(HistoryConfig::new(dir.path()))
            .unwrap()
            .with_clock(clock.clone());
        History::new(store, MemoryConfigStore::new())
    }

    fn float_tag(name: &str) -> Vec<Tag> {
        vec![Tag::new(name, TypeCode::Float, 1)]
    }

    #[test]
    fn test_id_allocation() {
        let dir = TempDir::new().unwrap();
        let mut history = history(&dir, &ManualClock::new(NOW));
        history
            .config_store_mut()
            .set_equipment_event_id("Trigger", 1);

        assert_eq!(history.define_event("Temp", &float_tag("T")).unwrap(), 101);
        assert_eq!(history.define_event("Pressure", &float_tag("P")).unwrap(), 102);
        assert_eq!(history.define_event("Trigger", &float_tag("R")).unwrap(), 1);
        assert_eq!(history.define_event(RUN_TRANSITIONS, &float_tag("State")).unwrap(), 0);
        assert_eq!(history.define_event("temp", &float_tag("T")).unwrap(), 101);
    }

    #[test]
    fn test_slashes_are_stored_as_colons() {
        let dir = TempDir::new().unwrap();
        let mut history = history(&dir, &ManualClock::new(NOW));
        let id = history.define_event("Cryo/Level", &float_tag("L")).unwrap();
        assert_eq!(
            history.config_store().registry_name(id).as_deref(),
            Some("Cryo:Level")
        );
        assert_eq!(history.define_event("Cryo/Level", &float_tag("L")).unwrap(), id);

        history.config_store_mut().clear_tag_metadata();
        assert_eq!(history.get_events(), vec!["Cryo/Level".to_string()]);
    }

    #[test]
    fn test_tag_metadata_merges_changes() {
        let dir = TempDir::new().unwrap();
        let mut history = history(&dir, &ManualClock::new(NOW));
        history.define_event("Temp", &float_tag("T")).unwrap();
        history
            .define_event(
                "Temp",
                &[
                    Tag::new("T", TypeCode::Double, 1),
                    Tag::new("Ok", TypeCode::Bool, 1),
                ],
            )
            .unwrap();

        let meta = history.config_store().tag_metadata_for("Temp").unwrap();
        assert_eq!(
            meta.tags,
            vec![
                Tag::new("T", TypeCode::Double, 1),
                Tag::new("Ok", TypeCode::Bool, 1),
            ]
        );
        assert_eq!(history.get_tags("TEMP").unwrap(), meta.tags);
    }

    #[test]
    fn test_write_requires_definition_through_facade() {
        let dir = TempDir::new().unwrap();
        let mut history = history(&dir, &ManualClock::new(NOW));
        assert!(matches!(
            history.write_event("Temp", &[0; 4]),
            Err(HistoryError::UndefinedEvent(_))
        ));
    }

    #[test]
    fn test_event_id_resolution_strategies() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(NOW);
        let mut history = history(&dir, &clock);
        let id = history.define_event("Temp", &float_tag("T")).unwrap();

        assert_eq!(history.get_event_id(0, "temp", Some("T")).unwrap(), id);

        // Registry only: confirmed against the stored definition.
        history.config_store_mut().clear_tag_metadata();
        history.clear_cache();
        assert_eq!(history.get_event_id(0, "Temp", Some("t")).unwrap(), id);

        // Nothing in the configuration store: definition indexes only.
        let mut fresh = History::new(
            HistoryStore::open(HistoryConfig::new(dir.path()))
                .unwrap()
                .with_clock(clock.clone()),
            MemoryConfigStore::new(),
        );
        assert_eq!(fresh.get_event_id(0, "Temp", None).unwrap(), id);
        assert!(matches!(
            fresh.get_event_id(0, "Unknown", None),
            Err(HistoryError::UndefinedEvent(_))
        ));
    }

    #[test]
    fn test_cache_is_kept_until_cleared() {
        let dir = TempDir::new().unwrap();
        let mut history = history(&dir, &ManualClock::new(NOW));
        history.define_event("Temp", &float_tag("T")).unwrap();
        assert_eq!(history.get_events(), vec!["Temp".to_string()]);

        history.define_event("Pressure", &float_tag("P")).unwrap();
        assert_eq!(history.get_events().len(), 1);
        history.clear_cache();
        assert_eq!(history.get_events().len(), 2);
    }

    #[test]
    fn test_read_retries_truncated_buffers() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(NOW);
        let mut history = history(&dir, &clock);
        history.define_event("Temp", &float_tag("T")).unwrap();
        let count = INITIAL_READ_SAMPLES as u32 + 500;
        for i in 0..count {
            clock.set(NOW + i);
            history.write_event("Temp", &(i as f32).to_le_bytes()).unwrap();
        }

        let results = history.read(NOW, NOW + count, 0, &[VarSpec::new("Temp", "T")]);
        let samples = results.into_iter().next().unwrap().unwrap();
        assert_eq!(samples.len(), count as usize);
        assert_eq!(samples[1234], Sample { time: NOW + 1234, value: 1234.0 });
    }
}
