//! Database collaborator: candidate listing, attribute updates, variables.
//!
//! The real binding (SQL layer) lives outside this crate; the engine only
//! needs filtered, sorted row listing plus per-entry update/remove and a
//! small named-variable store. [`MemDb`] is the in-memory adapter used for
//! bring-up and tests.

use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use reclaim_policy::{evaluate, Comparison, EntryAttrs, EntryId, EntryStatus, FileType};
use reclaim_policy::{BoolExpr, PolicyMatch};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Variable recording the end time of the last complete inventory pass.
pub const LAST_FULL_SCAN: &str = "last_full_scan";

/// Database-level candidate filter.
///
/// This is a coarse pre-filter: a row is excluded only when a condition
/// definitely does not match. Rows with missing attributes pass through so
/// the worker can refresh them and re-evaluate — collapsing "indeterminate"
/// into "excluded" at this level would silently drop candidates.
#[derive(Clone, Debug, Default)]
pub struct DbFilter {
    /// Exclude records already flagged invalid.
    pub not_invalid: bool,
    /// Restrict to one file type.
    pub ftype: Option<FileType>,
    /// Simple policy-derived conditions.
    pub conditions: Vec<Comparison>,
}

impl DbFilter {
    /// Whether a row passes the filter at time `now`.
    pub fn accepts(&self, attrs: &EntryAttrs, now: u64) -> bool {
        if self.not_invalid && attrs.status == Some(EntryStatus::Invalid) {
            return false;
        }
        if let (Some(want), Some(have)) = (self.ftype, attrs.ftype) {
            if want != have {
                return false;
            }
        }
        self.conditions.iter().all(|cmp| {
            let expr = BoolExpr::Condition(cmp.clone());
            evaluate(&expr, attrs, now) != PolicyMatch::NoMatch
        })
    }
}

/// Attribute the listing is ordered by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    /// Last modification time.
    LastMod,
    /// Last access time.
    LastAccess,
    /// Size in bytes.
    Size,
}

/// Deterministic listing order, so the most eligible candidates dispatch
/// first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSort {
    /// Sort attribute.
    pub field: SortField,
    /// Ascending (oldest/smallest first) when true.
    pub ascending: bool,
}

impl Default for DbSort {
    fn default() -> Self {
        Self {
            field: SortField::LastMod,
            ascending: true,
        }
    }
}

fn sort_key(attrs: &EntryAttrs, field: SortField) -> Option<u64> {
    match field {
        SortField::LastMod => attrs.last_mod,
        SortField::LastAccess => attrs.last_access,
        SortField::Size => attrs.size,
    }
}

/// Operations the engine consumes from the database layer.
pub trait EntryDb: Send + Sync {
    /// Lists `(id, attrs)` rows passing `filter`, ordered by `sort`.
    fn list(
        &self,
        filter: &DbFilter,
        sort: &DbSort,
        now: u64,
    ) -> EngineResult<Vec<(EntryId, EntryAttrs)>>;

    /// Writes the attribute set of one entry.
    fn update_attrs(&self, id: EntryId, attrs: &EntryAttrs) -> EngineResult<()>;

    /// Flags a record as invalid so the next inventory pass corrects it.
    fn invalidate(&self, id: EntryId) -> EngineResult<()>;

    /// Removes the record. `last_link` tells the binding whether the
    /// underlying object is gone or only one name of it.
    fn remove_entry(&self, id: EntryId, last_link: bool) -> EngineResult<()>;

    /// Reads a named variable.
    fn get_var(&self, name: &str) -> EngineResult<Option<String>>;

    /// Writes a named variable.
    fn set_var(&self, name: &str, value: &str) -> EngineResult<()>;
}

/// In-memory database adapter (concurrent maps, no persistence).
#[derive(Default)]
pub struct MemDb {
    entries: DashMap<EntryId, EntryAttrs>,
    vars: DashMap<String, String>,
}

impl MemDb {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub fn put(&self, id: EntryId, attrs: EntryAttrs) {
        self.entries.insert(id, attrs);
    }

    /// Reads one record.
    pub fn get(&self, id: EntryId) -> Option<EntryAttrs> {
        self.entries.get(&id).map(|r| r.clone())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the database holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntryDb for MemDb {
    fn list(
        &self,
        filter: &DbFilter,
        sort: &DbSort,
        now: u64,
    ) -> EngineResult<Vec<(EntryId, EntryAttrs)>> {
        let mut rows: Vec<(EntryId, EntryAttrs)> = self
            .entries
            .iter()
            .filter(|r| filter.accepts(r.value(), now))
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        rows.sort_by(|(aid, a), (bid, b)| {
            // Rows missing the sort attribute go last; ties break on id so
            // the order is deterministic.
            let ka = sort_key(a, sort.field);
            let kb = sort_key(b, sort.field);
            let ord = match (ka, kb) {
                (Some(x), Some(y)) => {
                    if sort.ascending {
                        x.cmp(&y)
                    } else {
                        y.cmp(&x)
                    }
                }
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            ord.then(aid.cmp(bid))
        });
        debug!(rows = rows.len(), "listing complete");
        Ok(rows)
    }

    fn update_attrs(&self, id: EntryId, attrs: &EntryAttrs) -> EngineResult<()> {
        match self.entries.get_mut(&id) {
            Some(mut record) => {
                record.merge(attrs);
                Ok(())
            }
            None => Err(EngineError::Db(format!("update of unknown entry {id}"))),
        }
    }

    fn invalidate(&self, id: EntryId) -> EngineResult<()> {
        if let Some(mut record) = self.entries.get_mut(&id) {
            record.status = Some(EntryStatus::Invalid);
        }
        Ok(())
    }

    fn remove_entry(&self, id: EntryId, _last_link: bool) -> EngineResult<()> {
        self.entries.remove(&id);
        Ok(())
    }

    fn get_var(&self, name: &str) -> EngineResult<Option<String>> {
        Ok(self.vars.get(name).map(|v| v.clone()))
    }

    fn set_var(&self, name: &str, value: &str) -> EngineResult<()> {
        self.vars.insert(name.to_string(), value.to_string());
        Ok(())
    }
}
