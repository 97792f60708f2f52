use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

struct ArmedTimer {
    generation: u64,
    cancel: CancellationToken,
}

/// One-shot timers keyed by zone name or alert id.
///
/// A timer posts its event back into the player loop when it elapses. Arming a
/// key that is already armed cancels the old timer first, so each key has at
/// most one pending timer. Every firing carries the generation it was armed
/// with; [`TimerSet::fire`] only accepts the generation that is still current,
/// which discards events that were already queued when their timer got
/// cancelled.
pub struct TimerSet<K> {
    armed: HashMap<K, ArmedTimer>,
    next_generation: u64,
}

impl<K> TimerSet<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            armed: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Returns the generation of the new timer.
    pub fn arm<E, F>(&mut self, key: K, delay: Duration, tx: &UnboundedSender<E>, make_event: F) -> u64
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E,
    {
        self.cancel(&key);

        let generation = self.next_generation;
        self.next_generation += 1;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tx = tx.clone();
        let event = make_event(generation);
        // Deadline is fixed at arm time, not when the task first gets polled
        let Some(deadline) = tokio::time::Instant::now().checked_add(delay) else {
            // Past the end of the clock: armed, but it never fires
            tracing::warn!("Timer {:?} delay {:?} is out of range, not scheduling", key, delay);
            self.armed.insert(key, ArmedTimer { generation, cancel });
            return generation;
        };

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = tx.send(event);
                }
            }
        });

        self.armed.insert(key, ArmedTimer { generation, cancel });
        generation
    }

    /// Returns true if a pending timer was cancelled.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.armed.remove(key) {
            Some(timer) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (key, timer) in self.armed.drain() {
            tracing::trace!("Cancelling timer {:?}", key);
            timer.cancel.cancel();
        }
    }

    /// Consumes a firing. False means the firing is stale and must be ignored.
    pub fn fire(&mut self, key: &K, generation: u64) -> bool {
        match self.armed.get(key) {
            Some(timer) if timer.generation == generation => {
                self.armed.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl<K> Default for TimerSet<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for TimerSet<K> {
    fn drop(&mut self) {
        for timer in self.armed.values() {
            timer.cancel.cancel();
        }
    }
}
