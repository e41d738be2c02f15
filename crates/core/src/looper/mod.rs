use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use crate::{ClockError, LoopSlots, MasterClock, Registration, Result};

/// Callback fired at the top of every loop iteration.
pub type Trigger = Arc<dyn Fn() + Send + Sync>;

/// Repeats a trigger every `loop_beats` beats on a shared [`MasterClock`].
///
/// The scheduled callback holds its own clone of the trigger, never the
/// looper, so dropping the looper is enough to stop it.
pub struct Looper {
    clock: Arc<MasterClock>,
    slot: String,
    tag: String,
    loop_beats: f64,
    interval: Duration,
    trigger: Trigger,
    looping: bool,
}

impl Looper {
    pub fn new<F>(
        clock: Arc<MasterClock>,
        slot: impl Into<String>,
        loop_beats: f64,
        trigger: F,
    ) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let slot = slot.into();
        let interval = clock
            .tempo()
            .beats_to_duration(loop_beats)
            .ok_or_else(|| {
                ClockError::msg(format!(
                    "loop `{slot}` must last a positive number of beats (got {loop_beats})"
                ))
            })?;

        Ok(Self {
            clock,
            tag: format!("looper:{slot}"),
            slot,
            loop_beats,
            interval,
            trigger: Arc::new(trigger),
            looping: false,
        })
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Tag the loop is registered under on the clock.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn loop_beats(&self) -> f64 {
        self.loop_beats
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedules the trigger to repeat every loop length. The first
    /// iteration fires one loop length from now.
    pub fn start_loop(&mut self) -> Registration {
        let trigger = self.trigger.clone();
        let outcome = self
            .clock
            .schedule(move || trigger(), self.interval, &self.tag, true);
        self.looping = outcome != Registration::Rejected;
        if self.looping {
            tracing::debug!(slot = %self.slot, loop_beats = self.loop_beats, "loop started");
        }
        outcome
    }

    pub fn stop_loop(&mut self) -> bool {
        if !self.looping {
            return false;
        }
        self.looping = false;
        tracing::debug!(slot = %self.slot, "loop stopped");
        self.clock.cancel(&self.tag)
    }

    pub fn is_looping(&self) -> bool {
        self.looping && self.clock.contains(&self.tag)
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        self.stop_loop();
    }
}

impl fmt::Debug for Looper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Looper")
            .field("slot", &self.slot)
            .field("loop_beats", &self.loop_beats)
            .field("interval", &self.interval)
            .field("looping", &self.looping)
            .finish()
    }
}

/// Keeps one running [`Looper`] per active entry of a [`LoopSlots`] table.
#[derive(Debug)]
pub struct LooperBank {
    clock: Arc<MasterClock>,
    loopers: BTreeMap<String, Looper>,
}

impl LooperBank {
    pub fn new(clock: Arc<MasterClock>) -> Self {
        Self {
            clock,
            loopers: BTreeMap::new(),
        }
    }

    /// Starts loopers for newly active slots and drops the ones whose slot
    /// went inactive. `make_trigger` is called once per started slot.
    pub fn sync<F, T>(&mut self, slots: &LoopSlots, mut make_trigger: F) -> Result<()>
    where
        F: FnMut(&str) -> T,
        T: Fn() + Send + Sync + 'static,
    {
        self.loopers.retain(|name, _| slots.is_active(name));

        for name in slots.active_slots() {
            if self.loopers.contains_key(&name) {
                continue;
            }
            let Some(loop_beats) = slots.loop_beats(&name) else {
                continue;
            };
            let trigger = make_trigger(&name);
            let mut looper = Looper::new(self.clock.clone(), name.clone(), loop_beats, trigger)?;
            looper.start_loop();
            self.loopers.insert(name, looper);
        }
        Ok(())
    }

    pub fn get(&self, slot: &str) -> Option<&Looper> {
        self.loopers.get(slot)
    }

    /// Slots with a running looper, in name order.
    pub fn running(&self) -> Vec<String> {
        self.loopers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.loopers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loopers.is_empty()
    }

    pub fn clear(&mut self) {
        self.loopers.clear();
    }
}
