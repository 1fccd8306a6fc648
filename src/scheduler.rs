use chrono::{DateTime, Duration, Utc};

/// Identifies one scheduled task so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug)]
struct Pending<T> {
    handle: TaskHandle,
    due: DateTime<Utc>,
    task: T,
}

/// Delayed tasks polled from the event loop.
///
/// Nothing runs on its own: the owner calls [`Scheduler::poll`] on every
/// tick and acts on whatever came due, so tasks never interleave with
/// other state changes.
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    pending: Vec<Pending<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: DateTime<Utc>, delay: Duration, task: T) -> TaskHandle {
        let handle = TaskHandle(self.next_id);
        self.next_id += 1;
        self.pending.push(Pending {
            handle,
            due: now + delay,
            task,
        });
        handle
    }

    /// Returns false when the task already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.handle != handle);
        self.pending.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.pending.iter().any(|p| p.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every task due at `now`, earliest first.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<T> {
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = waiting;
        due.sort_by_key(|p| (p.due, p.handle.0));
        due.into_iter().map(|p| p.task).collect()
    }
}
