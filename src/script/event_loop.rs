//! Single-threaded job loop for one script invocation
//!
//! Native work that finishes on another thread (fetch) reports back through a
//! [`CallbackEnqueuer`] obtained from [`EventLoop::register_callback`]. Timers
//! live on the loop itself and are moved into the job queue once due, so
//! every callback runs on the invocation's thread in enqueue order.

use super::fetch::{FetchError, ResponseData};
use crate::cancel::CancelToken;
use parking_lot::{Condvar, Mutex};
use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest a blocked loop sleeps before re-checking cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Work waiting to run on the loop thread
#[derive(Debug)]
pub enum Job {
    /// A due timer
    Timer(u64),
    /// A finished request for the promise registered under `id`
    Fetch {
        id: u64,
        outcome: Result<ResponseData, FetchError>,
    },
}

/// Why the loop stopped before running out of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Timeout,
    Cancelled,
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    pending: usize,
    closed: bool,
}

#[derive(Default)]
struct JobQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

/// One-shot handle for finishing a registered operation from any thread
pub struct CallbackEnqueuer {
    queue: Arc<JobQueue>,
    used: bool,
}

impl CallbackEnqueuer {
    /// Queue the job. Returns false when the loop has shut down.
    pub fn enqueue(mut self, job: Job) -> bool {
        self.used = true;
        let mut state = self.queue.state.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.closed {
            return false;
        }
        state.jobs.push_back(job);
        self.queue.ready.notify_one();
        true
    }
}

impl Drop for CallbackEnqueuer {
    fn drop(&mut self) {
        // the operation was abandoned, so the loop must not wait for it
        if !self.used {
            let mut state = self.queue.state.lock();
            state.pending = state.pending.saturating_sub(1);
            self.queue.ready.notify_one();
        }
    }
}

struct Timer {
    interval: Option<Duration>,
}

/// The loop driving one invocation
pub struct EventLoop {
    queue: Arc<JobQueue>,
    heap: RefCell<BinaryHeap<Reverse<(Instant, u64, u64)>>>,
    timers: RefCell<HashMap<u64, Timer>>,
    next_timer: Cell<u64>,
    sequence: Cell<u64>,
    deadline: Instant,
    cancel: CancelToken,
}

impl EventLoop {
    pub fn new(deadline: Instant, cancel: CancelToken) -> Self {
        Self {
            queue: Arc::new(JobQueue::default()),
            heap: RefCell::new(BinaryHeap::new()),
            timers: RefCell::new(HashMap::new()),
            next_timer: Cell::new(1),
            sequence: Cell::new(0),
            deadline,
            cancel,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Announce an operation that will finish later
    pub fn register_callback(&self) -> CallbackEnqueuer {
        self.queue.state.lock().pending += 1;
        CallbackEnqueuer {
            queue: self.queue.clone(),
            used: false,
        }
    }

    /// Schedule a timer, returning its id
    pub fn set_timer(&self, delay: Duration, repeat: bool) -> u64 {
        let id = self.next_timer.get();
        self.next_timer.set(id + 1);
        let interval = repeat.then_some(delay);
        self.timers.borrow_mut().insert(id, Timer { interval });
        self.arm(id, delay);
        id
    }

    fn arm(&self, id: u64, delay: Duration) {
        let seq = self.sequence.get();
        self.sequence.set(seq + 1);
        self.heap
            .borrow_mut()
            .push(Reverse((Instant::now() + delay, seq, id)));
    }

    /// Cancel a timer. Unknown or already fired ids are ignored.
    pub fn clear_timer(&self, id: u64) -> bool {
        self.timers.borrow_mut().remove(&id).is_some()
    }

    /// Whether the timer will fire again
    pub fn is_timer_live(&self, id: u64) -> bool {
        self.timers.borrow().contains_key(&id)
    }

    pub fn active_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    fn next_timer_deadline(&self) -> Option<Instant> {
        let mut heap = self.heap.borrow_mut();
        let timers = self.timers.borrow();
        // drop heap entries for cleared timers
        while let Some(Reverse((_, _, id))) = heap.peek() {
            if timers.contains_key(id) {
                break;
            }
            heap.pop();
        }
        heap.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Move every due timer into the job queue in deadline order
    fn promote_due_timers(&self) {
        let now = Instant::now();
        loop {
            let due = match self.next_timer_deadline() {
                Some(at) if at <= now => self.heap.borrow_mut().pop(),
                _ => None,
            };
            let Some(Reverse((_, _, id))) = due else {
                break;
            };
            let interval = match self.timers.borrow().get(&id) {
                Some(timer) => timer.interval,
                None => continue,
            };
            match interval {
                Some(every) => self.arm(id, every),
                None => {
                    self.timers.borrow_mut().remove(&id);
                }
            }
            self.queue.state.lock().jobs.push_back(Job::Timer(id));
        }
    }

    fn check(&self) -> Result<(), LoopExit> {
        if self.cancel.is_cancelled() {
            Err(LoopExit::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(LoopExit::Timeout)
        } else {
            Ok(())
        }
    }

    /// Take the next job, blocking while work is outstanding.
    ///
    /// `Ok(None)` means the loop is idle: no queued jobs, no registered
    /// operations and no live timers.
    pub fn next_job(&self) -> Result<Option<Job>, LoopExit> {
        loop {
            self.check()?;
            self.promote_due_timers();

            let wake_at = self.next_timer_deadline();
            let mut state = self.queue.state.lock();
            if let Some(job) = state.jobs.pop_front() {
                return Ok(Some(job));
            }
            if state.pending == 0 && wake_at.is_none() {
                return Ok(None);
            }

            let mut until = self.deadline.min(Instant::now() + POLL_INTERVAL);
            if let Some(at) = wake_at {
                until = until.min(at);
            }
            self.queue.ready.wait_until(&mut state, until);
        }
    }

    /// Refuse further work and forget every timer
    pub fn shutdown(&self) {
        let mut state = self.queue.state.lock();
        state.closed = true;
        state.jobs.clear();
        state.pending = 0;
        drop(state);
        self.timers.borrow_mut().clear();
        self.heap.borrow_mut().clear();
    }
}
