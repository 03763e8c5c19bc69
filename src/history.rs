//! Bounded, insertion-ordered history storage.
//!
//! [`BoundedHistory`] keeps a fixed-capacity window of items per source
//! key. Appends are O(1): once a key's window is full the oldest item is
//! dropped for each new one, so memory stays bounded no matter how long a
//! source keeps reporting. Keys are backed by independent cells so appends
//! for unrelated sources never contend; the outer map lock is only taken
//! for writing when a key is seen for the first time.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TelemetryError, TelemetryResult};

/// Items stored in a history expose the instant they occurred.
pub trait Timestamped {
    /// Timestamp used for ordering, time-window queries and purging.
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Half-open time window for history queries: `from` is inclusive, `to`
/// is exclusive. Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Creates a window covering `[from, to)`.
    #[must_use]
    pub const fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// Creates a window with only a lower bound.
    #[must_use]
    pub const fn since(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    /// Returns true if `ts` falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts < to)
    }
}

/// Result ordering for history queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrder {
    /// Most recent timestamps first. The default for administrative search.
    #[default]
    NewestFirst,
    /// Oldest timestamps first.
    OldestFirst,
}

type KeyCell<T> = Arc<Mutex<VecDeque<T>>>;

/// Fixed-capacity, insertion-ordered store keyed by source.
///
/// The window behaves like a ring: `append` pushes at the back and evicts
/// from the front once the key is at capacity. Read paths return clones of
/// the stored items; unknown keys yield empty results rather than errors.
pub struct BoundedHistory<T> {
    capacity: usize,
    keys: RwLock<HashMap<String, KeyCell<T>>>,
}

fn lock_err(context: &'static str) -> TelemetryError {
    TelemetryError::internal(format!("lock poisoned in {context}"))
}

impl<T> BoundedHistory<T>
where
    T: Timestamped + Clone,
{
    /// Creates a history retaining at most `capacity` items per key.
    ///
    /// A capacity of zero is treated as one; a store that can hold nothing
    /// has no meaningful behavior.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Per-key capacity of this history.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an item to `key`'s window, evicting the oldest item if the
    /// window is already full.
    pub fn append(&self, key: &str, item: T) -> TelemetryResult<()> {
        let cell = self.cell_for(key)?;
        let mut items = cell.lock().map_err(|_| lock_err("history append"))?;
        items.push_back(item);
        while items.len() > self.capacity {
            items.pop_front();
        }
        Ok(())
    }

    /// Returns up to the last `limit` items for `key` in insertion order.
    ///
    /// Unknown keys return an empty vector.
    pub fn for_key(&self, key: &str, limit: usize) -> TelemetryResult<Vec<T>> {
        let Some(cell) = self.existing_cell(key)? else {
            return Ok(Vec::new());
        };
        let items = cell.lock().map_err(|_| lock_err("history read"))?;
        let skip = items.len().saturating_sub(limit);
        Ok(items.iter().skip(skip).cloned().collect())
    }

    /// Queries the history across one key or all keys.
    ///
    /// Items must satisfy `predicate` and fall inside `window` when one is
    /// given. Results are sorted by timestamp according to `order`, then
    /// `offset`/`limit` pagination is applied. A `key` that was never
    /// appended to yields an empty result, never an error.
    pub fn query<F>(
        &self,
        key: Option<&str>,
        predicate: F,
        window: Option<&TimeWindow>,
        order: QueryOrder,
        offset: usize,
        limit: usize,
    ) -> TelemetryResult<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let cells = match key {
            Some(key) => match self.existing_cell(key)? {
                Some(cell) => vec![cell],
                None => return Ok(Vec::new()),
            },
            None => {
                let keys = self.keys.read().map_err(|_| lock_err("history query"))?;
                keys.values().map(Arc::clone).collect()
            }
        };

        let mut matched = Vec::new();
        for cell in cells {
            let items = cell.lock().map_err(|_| lock_err("history query"))?;
            for item in items.iter() {
                if window.is_some_and(|w| !w.contains(item.occurred_at())) {
                    continue;
                }
                if predicate(item) {
                    matched.push(item.clone());
                }
            }
        }

        match order {
            QueryOrder::NewestFirst => {
                matched.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));
            }
            QueryOrder::OldestFirst => {
                matched.sort_by(|a, b| a.occurred_at().cmp(&b.occurred_at()));
            }
        }

        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    /// Removes every item strictly older than `max_age` across all keys
    /// and returns the number removed.
    ///
    /// A `max_age` of zero removes everything appended before the call.
    pub fn purge_older_than(&self, max_age: Duration) -> TelemetryResult<usize> {
        let cutoff = Utc::now() - max_age;
        let cells: Vec<KeyCell<T>> = {
            let keys = self.keys.read().map_err(|_| lock_err("history purge"))?;
            keys.values().map(Arc::clone).collect()
        };

        let mut removed = 0;
        for cell in cells {
            let mut items = cell.lock().map_err(|_| lock_err("history purge"))?;
            let before = items.len();
            items.retain(|item| item.occurred_at() >= cutoff);
            removed += before - items.len();
        }
        Ok(removed)
    }

    /// Total number of retained items across all keys.
    pub fn len(&self) -> TelemetryResult<usize> {
        let cells: Vec<KeyCell<T>> = {
            let keys = self.keys.read().map_err(|_| lock_err("history len"))?;
            keys.values().map(Arc::clone).collect()
        };
        let mut total = 0;
        for cell in cells {
            total += cell.lock().map_err(|_| lock_err("history len"))?.len();
        }
        Ok(total)
    }

    /// Returns true if no key retains any item.
    pub fn is_empty(&self) -> TelemetryResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of retained items for one key. Unknown keys count zero.
    pub fn len_for_key(&self, key: &str) -> TelemetryResult<usize> {
        match self.existing_cell(key)? {
            Some(cell) => Ok(cell.lock().map_err(|_| lock_err("history len"))?.len()),
            None => Ok(0),
        }
    }

    /// Number of keys that have ever been appended to.
    ///
    /// Keys are never removed, matching the source lifecycle: a purge can
    /// empty a key's window but the key remains.
    pub fn key_count(&self) -> TelemetryResult<usize> {
        Ok(self.keys.read().map_err(|_| lock_err("history keys"))?.len())
    }

    fn existing_cell(&self, key: &str) -> TelemetryResult<Option<KeyCell<T>>> {
        let keys = self.keys.read().map_err(|_| lock_err("history read"))?;
        Ok(keys.get(key).map(Arc::clone))
    }

    fn cell_for(&self, key: &str) -> TelemetryResult<KeyCell<T>> {
        if let Some(cell) = self.existing_cell(key)? {
            return Ok(cell);
        }
        let mut keys = self.keys.write().map_err(|_| lock_err("history append"))?;
        let cell = keys
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())));
        Ok(Arc::clone(cell))
    }
}
