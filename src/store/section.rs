//! One bounded, descending-ordered, key-deduplicated section.

use super::search;
use crate::config::SectionSpec;
use crate::types::{EntityKey, EntityRecord, OrderStamp, SectionId, Timestamp};
use std::collections::HashMap;

/// Which path a merge took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Existing record updated without moving.
    UpdatedInPlace,
    /// Existing record removed and reinserted at its new position.
    Repositioned,
    /// New record inserted, section still within its limit.
    Inserted,
    /// New record inserted and the tail evicted. The evicted key may be
    /// the incoming record itself when it sorts below a full section.
    Evicted(EntityKey),
}

/// A section's records plus view metadata.
#[derive(Clone, Debug)]
pub struct Section {
    spec: SectionSpec,
    /// Strictly descending by stamp; equal stamps keep arrival order.
    records: Vec<EntityRecord>,
    /// Key -> current stamp, used to find a key's equal-stamp run.
    stamps: HashMap<EntityKey, OrderStamp>,
    loading: bool,
    error: Option<String>,
    last_update: Option<Timestamp>,
    visible: bool,
    search: String,
}

impl Section {
    pub(crate) fn new(spec: SectionSpec) -> Self {
        Self {
            spec,
            records: Vec::new(),
            stamps: HashMap::new(),
            loading: false,
            error: None,
            last_update: None,
            visible: true,
            search: String::new(),
        }
    }

    // --- Reads ---

    /// Section name.
    pub fn id(&self) -> &SectionId {
        &self.spec.id
    }

    /// Field layout the section was configured with.
    pub fn spec(&self) -> &SectionSpec {
        &self.spec
    }

    /// Records in descending stamp order.
    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    /// Number of records, never above the store limit.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True while a snapshot for this section is outstanding.
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Surfaced topic error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Wall-clock time of the last record write.
    pub fn last_update(&self) -> Option<Timestamp> {
        self.last_update
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    /// Whether `key` is currently held.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.stamps.contains_key(key)
    }

    pub fn get(&self, key: &EntityKey) -> Option<&EntityRecord> {
        self.position(key).map(|i| &self.records[i])
    }

    /// Index of `key`, found by binary search over its stamp.
    pub fn position(&self, key: &EntityKey) -> Option<usize> {
        let stamp = *self.stamps.get(key)?;
        let start = self.records.partition_point(|r| r.stamp > stamp);
        self.records[start..]
            .iter()
            .take_while(|r| r.stamp == stamp)
            .position(|r| &r.key == key)
            .map(|offset| start + offset)
    }

    /// Records matching the stored search query.
    pub fn filtered(&self) -> Vec<&EntityRecord> {
        self.filtered_by(&self.search)
    }

    /// Records matching `query` over the section's search fields.
    pub fn filtered_by(&self, query: &str) -> Vec<&EntityRecord> {
        search::filter(&self.records, &self.spec.search_fields, query)
    }

    // --- Mutations (driven by SectionStore) ---

    pub(crate) fn replace_all(&mut self, records: Vec<EntityRecord>, limit: usize) {
        let mut positions: HashMap<EntityKey, usize> = HashMap::with_capacity(records.len());
        let mut unique: Vec<EntityRecord> = Vec::with_capacity(records.len());

        for record in records {
            match positions.get(&record.key) {
                Some(&i) => unique[i].merge_from(record, &self.spec),
                None => {
                    positions.insert(record.key.clone(), unique.len());
                    unique.push(record);
                }
            }
        }

        // Stable: equal stamps keep snapshot order.
        unique.sort_by(|a, b| b.stamp.cmp(&a.stamp));
        unique.truncate(limit);

        self.stamps = unique.iter().map(|r| (r.key.clone(), r.stamp)).collect();
        self.records = unique;
        self.error = None;
        self.search.clear();
        self.last_update = Some(Timestamp::now());
    }

    pub(crate) fn merge(
        &mut self,
        record: EntityRecord,
        limit: usize,
        epsilon_ms: f64,
    ) -> MergeOutcome {
        self.last_update = Some(Timestamp::now());

        if let Some(index) = self.position(&record.key) {
            let key = record.key.clone();
            let old_stamp = self.records[index].stamp;
            self.records[index].merge_from(record, &self.spec);
            let new_stamp = self.records[index].stamp;
            self.stamps.insert(key, new_stamp);

            if new_stamp.within(old_stamp, epsilon_ms) && self.fits_at(index) {
                return MergeOutcome::UpdatedInPlace;
            }

            let merged = self.records.remove(index);
            let at = self.insertion_index(merged.stamp);
            self.records.insert(at, merged);
            return MergeOutcome::Repositioned;
        }

        let at = self.insertion_index(record.stamp);
        self.stamps.insert(record.key.clone(), record.stamp);
        self.records.insert(at, record);

        if self.records.len() > limit {
            let mut evicted = None;
            while self.records.len() > limit {
                if let Some(tail) = self.records.pop() {
                    self.stamps.remove(&tail.key);
                    evicted = Some(tail.key);
                }
            }
            if let Some(key) = evicted {
                return MergeOutcome::Evicted(key);
            }
        }
        MergeOutcome::Inserted
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.stamps.clear();
        self.loading = false;
        self.error = None;
        self.search.clear();
        self.last_update = Some(Timestamp::now());
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        self.error = error;
        self.loading = false;
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_search(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    /// First index whose stamp is strictly lower; equal stamps insert after
    /// the existing run.
    fn insertion_index(&self, stamp: OrderStamp) -> usize {
        self.records.partition_point(|r| r.stamp >= stamp)
    }

    fn fits_at(&self, index: usize) -> bool {
        let stamp = self.records[index].stamp;
        let after_prev = index == 0 || self.records[index - 1].stamp >= stamp;
        let before_next = index + 1 >= self.records.len() || self.records[index + 1].stamp <= stamp;
        after_prev && before_next
    }
}
