//! Identifier-indexed, execution-time-ordered store of [`Batch`]es.
//!
//! Batches live under stable keys that are never reused. The tag index maps a
//! tag to its key and the ordering vector holds keys sorted by execution
//! time, so removing or moving one batch never renumbers the others.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::{Action, Batch, BatchHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey(u64);

/// Outcome of [`BatchRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No batch used the tag; a new one was inserted.
    Created,
    /// Same tag and interval; the action joined the existing batch.
    Merged,
    /// Same tag, different interval; the old batch was discarded.
    Replaced,
    /// The interval was zero or the tag is reserved; nothing changed.
    Rejected,
}

/// A batch picked up by a due pass.
#[derive(Debug, Clone)]
pub struct DueBatch {
    pub key: BatchKey,
    pub tag: String,
    pub handle: BatchHandle,
}

#[derive(Debug, Default)]
pub struct BatchRegistry {
    next_key: u64,
    batches: HashMap<BatchKey, Batch>,
    keys_by_tag: HashMap<String, BatchKey>,
    order: Vec<BatchKey>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.keys_by_tag.contains_key(tag)
    }

    pub fn get(&self, tag: &str) -> Option<&Batch> {
        self.keys_by_tag
            .get(tag)
            .and_then(|key| self.batches.get(key))
    }

    /// Merges `action` into the batch registered under `tag` when the
    /// intervals match, otherwise installs a fresh batch due at
    /// `now + interval`.
    pub fn register(
        &mut self,
        action: Action,
        interval: Duration,
        tag: &str,
        looping: bool,
        now: Instant,
    ) -> Registration {
        if interval.is_zero() {
            return Registration::Rejected;
        }

        if let Some(batch) = self.get(tag).filter(|batch| batch.interval() == interval) {
            batch.add_action(action);
            return Registration::Merged;
        }

        let replaced = self.cancel(tag).is_some();
        let batch = Batch::new(tag, interval, looping, now + interval, action);
        self.insert(batch);

        if replaced {
            Registration::Replaced
        } else {
            Registration::Created
        }
    }

    /// Removes the batch registered under `tag` and invalidates its handle so
    /// an in-flight pass will not run it. Unknown tags are ignored.
    pub fn cancel(&mut self, tag: &str) -> Option<Batch> {
        let key = self.keys_by_tag.remove(tag)?;
        self.order.retain(|ordered| *ordered != key);
        let batch = self.batches.remove(&key)?;
        batch.handle().invalidate();
        Some(batch)
    }

    /// Every batch due at `now`, in ascending execution-time order.
    pub fn due(&self, now: Instant) -> Vec<DueBatch> {
        self.order
            .iter()
            .map_while(|key| {
                let batch = self.batches.get(key)?;
                batch.is_due(now).then(|| DueBatch {
                    key: *key,
                    tag: batch.tag().to_string(),
                    handle: batch.handle(),
                })
            })
            .collect()
    }

    /// Finishes a batch after its pass: looping batches move to
    /// `now + interval`, one-shot batches leave the registry. Keys cancelled
    /// or replaced while the batch ran are ignored.
    pub fn complete(&mut self, key: BatchKey, now: Instant) {
        let Some(batch) = self.batches.get_mut(&key) else {
            return;
        };

        if !batch.is_looping() {
            let tag = batch.tag().to_string();
            self.cancel(&tag);
            return;
        }

        batch.advance(now);
        self.order.retain(|ordered| *ordered != key);
        self.insert_key(key);
    }

    /// Earliest execution time across all batches.
    pub fn next_wake(&self) -> Option<Instant> {
        self.order
            .first()
            .and_then(|key| self.batches.get(key))
            .map(Batch::execution_time)
    }

    /// Batches in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Batch> {
        self.order.iter().filter_map(|key| self.batches.get(key))
    }

    pub fn tags(&self) -> Vec<String> {
        self.iter().map(|batch| batch.tag().to_string()).collect()
    }

    fn insert(&mut self, batch: Batch) -> BatchKey {
        let key = BatchKey(self.next_key);
        self.next_key += 1;
        self.keys_by_tag.insert(batch.tag().to_string(), key);
        self.batches.insert(key, batch);
        self.insert_key(key);
        key
    }

    /// Places `key` after every batch due at or before it, so equal times
    /// keep insertion order.
    fn insert_key(&mut self, key: BatchKey) {
        let Some(time) = self.batches.get(&key).map(Batch::execution_time) else {
            return;
        };
        let position = self.order.partition_point(|ordered| {
            self.batches
                .get(ordered)
                .is_some_and(|batch| batch.execution_time() <= time)
        });
        self.order.insert(position, key);
    }
}
