use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};

/// State of one named loop slot (a keypad key on the instrument).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopSlot {
    pub active: bool,
    /// Loop length in beats.
    pub loop_beats: f64,
}

/// Shared table of named loop slots. Clones share the same table, so the
/// input side can flip a flag that the looper side reads.
#[derive(Debug, Clone, Default)]
pub struct LoopSlots {
    shared: Arc<RwLock<BTreeMap<String, LoopSlot>>>,
}

impl LoopSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an inactive slot for every `(name, loop_beats)` pair.
    pub fn from_lengths<I, S>(lengths: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let slots = Self::new();
        for (name, loop_beats) in lengths {
            slots.insert(name, loop_beats);
        }
        slots
    }

    /// Registers (or resets) a slot as inactive.
    pub fn insert(&self, name: impl Into<String>, loop_beats: f64) {
        self.write().insert(
            name.into(),
            LoopSlot {
                active: false,
                loop_beats,
            },
        );
    }

    /// Sets the active flag. Returns `false` when the slot does not exist.
    pub fn set_active(&self, name: &str, active: bool) -> bool {
        match self.write().get_mut(name) {
            Some(slot) => {
                slot.active = active;
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.read().get(name).is_some_and(|slot| slot.active)
    }

    pub fn get(&self, name: &str) -> Option<LoopSlot> {
        self.read().get(name).copied()
    }

    pub fn loop_beats(&self, name: &str) -> Option<f64> {
        self.get(name).map(|slot| slot.loop_beats)
    }

    /// Names of every active slot, in name order.
    pub fn active_slots(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|(_, slot)| slot.active)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn first_active(&self) -> Option<String> {
        self.read()
            .iter()
            .find(|(_, slot)| slot.active)
            .map(|(name, _)| name.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, LoopSlot>> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, LoopSlot>> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }
}
