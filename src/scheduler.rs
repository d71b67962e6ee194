use std::cmp::Ordering;
use std::collections::hash_map::HashMap;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::SchedulerError;

pub const DEFAULT_LOOKAHEAD: f64 = 0.1;

/// Anything that can say what time it is, in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// What a producer is told when it fires.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    /// the time the producer asked to be called at
    pub current_time: f64,
    /// where the clock actually is
    pub audio_time: f64,
    /// clock advance since the previous scheduler tick
    pub dt: f64,
}

struct Entry<P> {
    time: f64,
    seq: u64,
    key: P,
}

// BinaryHeap is a max-heap; flip so the earliest (time, seq) pops first
impl<P> Ord for Entry<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<P> PartialOrd for Entry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> PartialEq for Entry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P> Eq for Entry<P> {}

enum DeferredOp<P> {
    Add(P, Option<f64>),
    Remove(P),
}

/// Add/remove requests made while the scheduler is dispatching.
///
/// A removal stops the producer from being called again right away, even if
/// it is still due in the current tick. Everything is applied to the queue
/// once the tick finishes.
pub struct Deferred<P> {
    ops: Vec<DeferredOp<P>>,
}

impl<P: Copy + Eq> Deferred<P> {
    fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn add(&mut self, key: P, start_time: Option<f64>) {
        self.ops.push(DeferredOp::Add(key, start_time));
    }

    pub fn remove(&mut self, key: P) {
        self.ops.push(DeferredOp::Remove(key));
    }

    fn is_removed(&self, key: P) -> bool {
        self.ops.iter().any(|op| matches!(op, DeferredOp::Remove(k) if *k == key))
    }
}

/// Lookahead scheduler.
///
/// Holds keys, not producers: each `tick` hands the due keys to a dispatch
/// closure which runs the producer and returns when it wants to fire next.
/// Everything due before `now + lookahead` fires in the same tick, so the
/// audio side always has events queued a little ahead of the playhead.
pub struct Scheduler<K, P> {
    clock: K,
    lookahead: f64,
    heap: BinaryHeap<Entry<P>>,
    // key -> seq of its live entry; heap entries with another seq are stale
    live: HashMap<P, u64>,
    next_seq: u64,
    last_now: Option<f64>,
}

impl<K: Clock, P: Copy + Eq + Hash + Debug> Scheduler<K, P> {
    pub fn new(clock: K) -> Self {
        Self::with_lookahead(clock, DEFAULT_LOOKAHEAD)
    }

    pub fn with_lookahead(clock: K, lookahead: f64) -> Self {
        Self {
            clock,
            lookahead: lookahead.max(0.0),
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
            last_now: None,
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn set_lookahead(&mut self, lookahead: f64) {
        if !lookahead.is_finite() || lookahead < 0.0 {
            tracing::warn!(lookahead, "ignoring invalid lookahead");
            return;
        }
        self.lookahead = lookahead;
    }

    /// Schedule `key` at `start_time`, or now. An active key is rescheduled.
    pub fn add(&mut self, key: P, start_time: Option<f64>) {
        let time = start_time.unwrap_or_else(|| self.clock.now());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(key, seq);
        self.heap.push(Entry { time, seq, key });
        tracing::debug!(?key, time, "producer added");
    }

    pub fn remove(&mut self, key: P) {
        if self.live.remove(&key).is_some() {
            tracing::debug!(?key, "producer removed");
        }
        // stale heap entries are skipped on pop; drop them once nothing is live
        if self.live.is_empty() {
            self.heap.clear();
        }
    }

    pub fn contains(&self, key: P) -> bool {
        self.live.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Next time `key` will fire.
    pub fn next_time(&self, key: P) -> Option<f64> {
        let seq = self.live.get(&key)?;
        self.heap.iter().find(|e| e.seq == *seq).map(|e| e.time)
    }

    /// Fire everything due before `now + lookahead`.
    ///
    /// Returns how many producers ran. A producer that does not move its time
    /// forward is removed and reported as `SchedulerError::Stalled`; nothing
    /// else due in this tick runs after it.
    pub fn tick<F>(&mut self, mut dispatch: F) -> Result<usize, SchedulerError>
    where
        F: FnMut(P, Tick, &mut Deferred<P>) -> f64,
    {
        let now = self.clock.now();
        let dt = self.last_now.map_or(0.0, |last| now - last);
        self.last_now = Some(now);
        let horizon = now + self.lookahead;

        let mut deferred = Deferred::new();
        let mut fired = 0;
        let mut outcome = Ok(());

        while self.heap.peek().is_some_and(|top| top.time < horizon) {
            let Some(entry) = self.heap.pop() else { break };
            if self.live.get(&entry.key) != Some(&entry.seq) || deferred.is_removed(entry.key) {
                continue;
            }

            let tick = Tick { current_time: entry.time, audio_time: now, dt };
            let next = dispatch(entry.key, tick, &mut deferred);
            fired += 1;

            if deferred.is_removed(entry.key) {
                continue;
            }
            if !next.is_finite() || next <= entry.time {
                self.live.remove(&entry.key);
                let err = SchedulerError::Stalled {
                    key: format!("{:?}", entry.key),
                    current: entry.time,
                    returned: next,
                };
                tracing::error!("{err}");
                outcome = Err(err);
                break;
            }
            self.heap.push(Entry { time: next, ..entry });
        }

        for op in deferred.ops {
            match op {
                DeferredOp::Add(key, start) => self.add(key, start),
                DeferredOp::Remove(key) => self.remove(key),
            }
        }

        outcome.map(|()| fired)
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::Clock;

    /// Test clock; clones share the same time.
    #[derive(Clone, Default)]
    pub struct ManualClock(Rc<Cell<f64>>);

    impl ManualClock {
        pub fn new(t: f64) -> Self {
            Self(Rc::new(Cell::new(t)))
        }

        pub fn set(&self, t: f64) {
            self.0.set(t);
        }

        pub fn advance(&self, dt: f64) {
            self.0.set(self.0.get() + dt);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> f64 {
            self.0.get()
        }
    }
}
