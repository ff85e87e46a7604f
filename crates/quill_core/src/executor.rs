//! Operation serializer.
//!
//! Every mutating and reading path of the store runs through an
//! [`Executor`]: a single-slot FIFO queue. A submitted task parks its
//! calling thread until its ticket is served, runs alone, and hands the
//! slot to the next ticket, so index mutation and log writes never
//! interleave.
//!
//! The executor starts **unready**. Normal tasks submitted before that
//! wait in a buffered lane; tasks in the forced lane (database load) run
//! regardless and always ahead of the buffered lane. [`Executor::set_ready`]
//! opens the buffered lane, draining it in submission order.
//!
//! Tasks must not submit to the executor they are running on; doing so
//! would deadlock the slot.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Default)]
struct ExecState {
    ready: bool,
    busy: bool,
    next_ticket: u64,
    forced: VecDeque<u64>,
    buffered: VecDeque<u64>,
}

impl ExecState {
    fn can_run(&self, ticket: u64) -> bool {
        if self.busy {
            return false;
        }
        if let Some(&front) = self.forced.front() {
            return front == ticket;
        }
        self.ready && self.buffered.front() == Some(&ticket)
    }

    fn is_empty(&self) -> bool {
        !self.busy && self.forced.is_empty() && self.buffered.is_empty()
    }
}

/// A single-slot FIFO task queue with a pre-ready buffer.
#[derive(Default)]
pub struct Executor {
    state: Mutex<ExecState>,
    cond: Condvar,
}

impl Executor {
    /// Creates a new executor in the unready state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` in the execution slot once its turn comes.
    ///
    /// Blocks the calling thread until the executor is ready and every
    /// earlier submission has completed, then runs the task and returns
    /// its value.
    pub fn submit<R>(&self, task: impl FnOnce() -> R) -> R {
        self.run(false, task)
    }

    /// Runs `task` even while the executor is unready.
    ///
    /// Forced tasks form their own lane that is always served before the
    /// buffered lane. Used by database load, which must run before the
    /// operations buffered behind it.
    pub fn submit_forced<R>(&self, task: impl FnOnce() -> R) -> R {
        self.run(true, task)
    }

    fn run<R>(&self, forced: bool, task: impl FnOnce() -> R) -> R {
        let ticket;
        {
            let mut state = self.state.lock();
            ticket = state.next_ticket;
            state.next_ticket += 1;
            if forced {
                state.forced.push_back(ticket);
            } else {
                state.buffered.push_back(ticket);
            }
            while !state.can_run(ticket) {
                self.cond.wait(&mut state);
            }
            state.busy = true;
            if state.forced.front() == Some(&ticket) {
                state.forced.pop_front();
            } else {
                state.buffered.pop_front();
            }
        }

        let result = task();

        let mut state = self.state.lock();
        state.busy = false;
        self.cond.notify_all();
        result
    }

    /// Flips the executor to ready, draining the buffered lane in
    /// submission order.
    pub fn set_ready(&self) {
        let mut state = self.state.lock();
        state.ready = true;
        self.cond.notify_all();
    }

    /// Returns whether the buffered lane is open.
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Blocks until the queue is empty and no task is running.
    pub fn wait_empty(&self) {
        let mut state = self.state.lock();
        while !state.is_empty() {
            self.cond.wait(&mut state);
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Executor")
            .field("ready", &state.ready)
            .field("busy", &state.busy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn ready_executor_runs_inline() {
        let exec = Executor::new();
        exec.set_ready();
        assert_eq!(exec.submit(|| 42), 42);
    }

    #[test]
    fn forced_task_runs_while_unready() {
        let exec = Executor::new();
        assert_eq!(exec.submit_forced(|| "loaded"), "loaded");
        assert!(!exec.is_ready());
    }

    #[test]
    fn buffered_tasks_wait_for_ready() {
        let exec = Arc::new(Executor::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let exec = Arc::clone(&exec);
                let ran = Arc::clone(&ran);
                thread::spawn(move || {
                    exec.submit(|| {
                        ran.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        exec.set_ready();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn forced_lane_runs_before_buffer() {
        let exec = Arc::new(Executor::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let buffered = {
            let exec = Arc::clone(&exec);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                exec.submit(|| order.lock().push("buffered"));
            })
        };

        // Give the buffered task time to enqueue first.
        thread::sleep(Duration::from_millis(50));

        {
            let order = Arc::clone(&order);
            exec.submit_forced(move || order.lock().push("forced"));
        }
        exec.set_ready();
        buffered.join().unwrap();

        assert_eq!(*order.lock(), vec!["forced", "buffered"]);
    }

    #[test]
    fn tasks_are_serialized() {
        let exec = Arc::new(Executor::new());
        exec.set_ready();
        let concurrent = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let exec = Arc::clone(&exec);
                let concurrent = Arc::clone(&concurrent);
                thread::spawn(move || {
                    exec.submit(|| {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(now, 0);
                        thread::sleep(Duration::from_millis(2));
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn wait_empty_observes_drain() {
        let exec = Arc::new(Executor::new());
        exec.set_ready();

        let worker = {
            let exec = Arc::clone(&exec);
            thread::spawn(move || {
                exec.submit(|| thread::sleep(Duration::from_millis(20)));
            })
        };

        thread::sleep(Duration::from_millis(5));
        exec.wait_empty();
        worker.join().unwrap();
    }
}
