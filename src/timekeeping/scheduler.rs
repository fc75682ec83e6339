use super::clock::Clock;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Callback fired by the scheduler once its due time is reached
pub type ScheduledCallback = Box<dyn FnOnce() + Send>;

struct Entry {
    due: f64,
    token: u64,
    callback: ScheduledCallback,
}

#[derive(Default)]
struct Queue {
    entries: Vec<Entry>,
    next_token: u64,
    stopping: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

/// Fires callbacks on a dedicated worker thread at clock-defined due times.
///
/// Tokens are non-zero and never reused within a scheduler's lifetime, so
/// zero is free to mean "nothing scheduled". A callback may fire at any
/// time at or after its due time; it never fires early and never fires
/// after a successful [`cancel`](Self::cancel).
///
/// The worker sleeps until the earliest due time and re-reads the clock on
/// every wakeup, so clocks that are advanced by hand work as long as the
/// caller follows each advance with [`wake_up`](Self::wake_up).
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                entries: Vec::new(),
                next_token: 1,
                stopping: false,
            }),
            wakeup: Condvar::new(),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            let clock = Arc::clone(&clock);
            std::thread::spawn(move || run_worker(shared, clock))
        };
        Self {
            clock,
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// The clock this scheduler reads due times against.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Schedule `callback` to fire at time `due` (seconds on this
    /// scheduler's clock). Returns a non-zero token usable with
    /// [`cancel`](Self::cancel).
    pub fn schedule(&self, callback: ScheduledCallback, due: f64) -> u64 {
        let mut queue = self.shared.queue.lock();
        let token = queue.next_token;
        queue.next_token += 1;
        queue.entries.push(Entry {
            due,
            token,
            callback,
        });
        self.shared.wakeup.notify_one();
        token
    }

    /// Cancel a scheduled callback. A token that already fired (or was
    /// already cancelled) is ignored.
    pub fn cancel(&self, token: u64) {
        let mut queue = self.shared.queue.lock();
        queue.entries.retain(|entry| entry.token != token);
        self.shared.wakeup.notify_one();
    }

    /// Force the worker to re-read the clock. Required after manually
    /// advancing an injected test clock.
    pub fn wake_up(&self) {
        self.shared.wakeup.notify_one();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.stopping = true;
            queue.entries.clear();
        }
        self.shared.wakeup.notify_one();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(shared: Arc<Shared>, clock: Arc<dyn Clock>) {
    debug!("scheduler worker started");
    let mut queue = shared.queue.lock();
    loop {
        if queue.stopping {
            break;
        }
        let now = clock.now();
        let mut due_now = Vec::new();
        let mut index = 0;
        while index < queue.entries.len() {
            if queue.entries[index].due <= now {
                due_now.push(queue.entries.remove(index));
            } else {
                index += 1;
            }
        }
        if !due_now.is_empty() {
            drop(queue);
            due_now.sort_by(|a, b| a.due.total_cmp(&b.due));
            for entry in due_now {
                (entry.callback)();
            }
            queue = shared.queue.lock();
            continue;
        }
        let next_due = queue
            .entries
            .iter()
            .map(|entry| entry.due)
            .fold(f64::INFINITY, f64::min);
        if next_due.is_finite() {
            let wait = (next_due - now).max(0.0);
            let _ = shared
                .wakeup
                .wait_for(&mut queue, Duration::from_secs_f64(wait));
        } else {
            shared.wakeup.wait(&mut queue);
        }
    }
    debug!("scheduler worker exiting");
}
