//! Bounded ordered section store.
//!
//! Holds a fixed set of sections, each a capacity-bounded collection of
//! records kept strictly descending by the section's ordering field and
//! deduplicated by identity key. The store is single-writer: it has no
//! interior locking and every mutation goes through `&mut self`.
//!
//! Mutations mark sections dirty; [`SectionStore::publish_changes`] sends one
//! [`StoreEvent::Changed`] per batch of mutations to every watcher.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tick_sync::{SectionSpec, SectionStore, StoreConfig};
//!
//! let mut store = SectionStore::new(StoreConfig {
//!     limit: 3,
//!     ..StoreConfig::with_sections(vec![SectionSpec::new("new")])
//! })?;
//! let new = "new".into();
//!
//! let record = store.parse_record(&new, json!({"address": "0x1", "chain": "sol", "createdAt": 10}))?;
//! store.merge(&new, record)?;
//! assert_eq!(store.section(&new)?.len(), 1);
//! # Ok::<(), tick_sync::SyncError>(())
//! ```

mod notify;
mod search;
mod section;

pub use notify::{StoreEvent, StoreWatch};
pub use section::{MergeOutcome, Section};

use crate::config::StoreConfig;
use crate::error::{Result, SyncError};
use crate::types::{EntityRecord, SectionId};
use notify::ChangeNotifier;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::trace;

/// The section store.
pub struct SectionStore {
    config: StoreConfig,
    /// Sections in configuration order.
    sections: Vec<Section>,
    notifier: ChangeNotifier,
    dirty: BTreeSet<SectionId>,
    revision: u64,
}

impl SectionStore {
    /// Create a store with one empty section per configured spec.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let sections = config.sections.iter().cloned().map(Section::new).collect();
        let notifier = ChangeNotifier::new(config.watch_buffer);

        Ok(Self {
            config,
            sections,
            notifier,
            dirty: BTreeSet::new(),
            revision: 0,
        })
    }

    /// Monotonic counter bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // --- Reads ---

    pub fn section(&self, id: &SectionId) -> Result<&Section> {
        self.sections
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| SyncError::UnknownSection(id.clone()))
    }

    pub fn section_ids(&self) -> Vec<SectionId> {
        self.sections.iter().map(|s| s.id().clone()).collect()
    }

    pub fn has_section(&self, id: &SectionId) -> bool {
        self.sections.iter().any(|s| s.id() == id)
    }

    /// Records matching the section's stored search query.
    pub fn filtered(&self, id: &SectionId) -> Result<Vec<&EntityRecord>> {
        Ok(self.section(id)?.filtered())
    }

    /// Records matching an explicit query.
    pub fn filtered_by(&self, id: &SectionId, query: &str) -> Result<Vec<&EntityRecord>> {
        Ok(self.section(id)?.filtered_by(query))
    }

    /// Build a record for `id` from a JSON object.
    pub fn parse_record(&self, id: &SectionId, value: Value) -> Result<EntityRecord> {
        EntityRecord::from_value(self.section(id)?.spec(), value)
    }

    // --- Writes ---

    /// Replace the section's records with the newest `limit` of `records`.
    /// Clears error and search; loading is left as is.
    pub fn replace_all(&mut self, id: &SectionId, records: Vec<EntityRecord>) -> Result<()> {
        let limit = self.config.limit;
        let count = records.len();
        self.mutate(id, |section| section.replace_all(records, limit))?;
        trace!(section = %id, records = count, "replace_all");
        Ok(())
    }

    /// Insert or update one record.
    pub fn merge(&mut self, id: &SectionId, record: EntityRecord) -> Result<MergeOutcome> {
        let limit = self.config.limit;
        let epsilon = self.config.same_moment_epsilon_ms;
        self.mutate(id, |section| section.merge(record, limit, epsilon))
    }

    /// Empty the section and clear loading, error and search.
    pub fn clear(&mut self, id: &SectionId) -> Result<()> {
        self.mutate(id, Section::clear)
    }

    pub fn set_loading(&mut self, id: &SectionId, loading: bool) -> Result<()> {
        self.mutate(id, |section| section.set_loading(loading))
    }

    /// Set or clear the section error. Always forces loading off.
    pub fn set_error(&mut self, id: &SectionId, error: Option<String>) -> Result<()> {
        self.mutate(id, |section| section.set_error(error))
    }

    pub fn set_visible(&mut self, id: &SectionId, visible: bool) -> Result<()> {
        self.mutate(id, |section| section.set_visible(visible))
    }

    pub fn set_search(&mut self, id: &SectionId, query: impl Into<String>) -> Result<()> {
        let query = query.into();
        self.mutate(id, |section| section.set_search(query))
    }

    /// Clear every section.
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.clear();
            self.dirty.insert(section.id().clone());
        }
        self.revision += 1;
    }

    // --- Change signal ---

    pub fn watch(&mut self) -> StoreWatch {
        self.notifier.watch()
    }

    /// Broadcast pending changes. Returns false when nothing changed.
    pub fn publish_changes(&mut self) -> bool {
        if self.dirty.is_empty() {
            return false;
        }
        let sections: Vec<SectionId> = std::mem::take(&mut self.dirty).into_iter().collect();
        self.notifier.broadcast(StoreEvent::Changed {
            sections,
            revision: self.revision,
        });
        true
    }

    fn mutate<R>(&mut self, id: &SectionId, f: impl FnOnce(&mut Section) -> R) -> Result<R> {
        let section = self
            .sections
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or_else(|| SyncError::UnknownSection(id.clone()))?;

        let result = f(section);
        self.revision += 1;
        self.dirty.insert(id.clone());
        Ok(result)
    }
}
