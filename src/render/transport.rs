// Transport - Time-ordered one-shot callbacks
// Offline transports fire everything in order; live transports follow a clock

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Instant;

/// A one-shot callback receiving the context and its scheduled time
pub type Callback<C> = Box<dyn FnOnce(&mut C, f64)>;

/// Something callbacks can be scheduled on
pub trait Transport<C> {
    /// Current transport time (seconds)
    fn now(&self) -> f64;

    /// Schedule a callback at an absolute time (past times fire as soon as possible)
    fn schedule(&mut self, time: f64, callback: Callback<C>);

    /// Callbacks not yet fired
    fn pending(&self) -> usize;
}

struct Entry<C> {
    time: f64,
    seq: u64,
    callback: Callback<C>,
}

impl<C> PartialEq for Entry<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<C> Eq for Entry<C> {}

impl<C> PartialOrd for Entry<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Entry<C> {
    // Reversed: the max-heap yields the earliest (time, seq) first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of callbacks ordered by (time, insertion)
pub struct CallbackQueue<C> {
    heap: BinaryHeap<Entry<C>>,
    next_seq: u64,
}

impl<C> CallbackQueue<C> {
    pub fn new() -> Self {
        CallbackQueue {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, time: f64, callback: Callback<C>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { time, seq, callback });
    }

    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }

    /// Pop the next callback if it is due by `until`
    pub fn pop_due(&mut self, until: f64) -> Option<(f64, Callback<C>)> {
        match self.next_time() {
            Some(time) if time <= until => self.heap.pop().map(|e| (e.time, e.callback)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<C> Default for CallbackQueue<C> {
    fn default() -> Self {
        CallbackQueue::new()
    }
}

fn sanitize_time(time: f64, now: f64) -> f64 {
    if time.is_finite() {
        time.max(now)
    } else {
        now
    }
}

/// Transport for offline rendering: time only moves when callbacks fire
pub struct OfflineTransport<C> {
    queue: CallbackQueue<C>,
    now: f64,
}

impl<C> OfflineTransport<C> {
    pub fn new() -> Self {
        OfflineTransport {
            queue: CallbackQueue::new(),
            now: 0.0,
        }
    }

    pub fn next_time(&self) -> Option<f64> {
        self.queue.next_time()
    }

    /// Pop the next callback due by `until`, advancing transport time to it
    pub fn pop_next(&mut self, until: f64) -> Option<(f64, Callback<C>)> {
        let (time, callback) = self.queue.pop_due(until)?;
        self.now = time;
        Some((time, callback))
    }

    /// Fire every callback due by `until` in time order; returns how many fired
    pub fn run_until(&mut self, ctx: &mut C, until: f64) -> usize {
        let mut fired = 0;
        while let Some((time, callback)) = self.pop_next(until) {
            callback(ctx, time);
            fired += 1;
        }
        self.now = self.now.max(until);
        fired
    }
}

impl<C> Default for OfflineTransport<C> {
    fn default() -> Self {
        OfflineTransport::new()
    }
}

impl<C> Transport<C> for OfflineTransport<C> {
    fn now(&self) -> f64 {
        self.now
    }

    fn schedule(&mut self, time: f64, callback: Callback<C>) {
        let time = sanitize_time(time, self.now);
        self.queue.push(time, callback);
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// A source of the current time for live playback
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall-clock time since creation
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock::default()
    }

    pub fn set(&self, time: f64) {
        self.time.set(time);
    }

    pub fn advance(&self, seconds: f64) {
        self.time.set(self.time.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.time.get()
    }
}

/// Transport driven by a clock: callbacks fire once `clock + lookahead` reaches them
pub struct LiveTransport<C, K: Clock> {
    queue: CallbackQueue<C>,
    clock: K,
    lookahead: f64,
}

impl<C, K: Clock> LiveTransport<C, K> {
    pub fn new(clock: K, lookahead: f64) -> Self {
        LiveTransport {
            queue: CallbackQueue::new(),
            clock,
            lookahead: lookahead.max(0.0),
        }
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Time up to which callbacks are fired
    pub fn horizon(&self) -> f64 {
        self.clock.now() + self.lookahead
    }

    /// Fire every callback inside the lookahead window; returns how many fired
    pub fn poll(&mut self, ctx: &mut C) -> usize {
        let horizon = self.horizon();
        let mut fired = 0;
        while let Some((time, callback)) = self.queue.pop_due(horizon) {
            callback(ctx, time);
            fired += 1;
        }
        fired
    }

    /// Drop every pending callback
    pub fn stop(&mut self) {
        self.queue.clear();
    }
}

impl<C, K: Clock> Transport<C> for LiveTransport<C, K> {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn schedule(&mut self, time: f64, callback: Callback<C>) {
        let time = sanitize_time(time, self.clock.now());
        self.queue.push(time, callback);
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
