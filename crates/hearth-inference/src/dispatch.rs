use hearth_core::Priority;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// A queued request waiting for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    priority: Priority,
    seq: u64,
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: the most urgent tier wins, then the earliest submission.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct DispatchState {
    waiting: BinaryHeap<Ticket>,
    in_flight: usize,
    next_seq: u64,
}

struct Shared {
    capacity: usize,
    state: Mutex<DispatchState>,
    wake: Notify,
}

/// Admits requests into a fixed number of execution slots.
///
/// A request is admitted only when a slot is free and it is the most urgent
/// waiter; ties within a priority tier go to the earliest submission.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Dispatcher with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity: capacity.max(1),
                state: Mutex::new(DispatchState {
                    waiting: BinaryHeap::new(),
                    in_flight: 0,
                    next_seq: 0,
                }),
                wake: Notify::new(),
            }),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Requests queued and not yet admitted.
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiting.len()
    }

    /// Requests currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight
    }

    /// Queue at `priority` and wait for a slot.
    ///
    /// The returned [`Permit`] releases the slot when dropped.
    pub async fn acquire(&self, priority: Priority) -> Permit {
        let ticket = {
            let mut state = self.shared.state.lock();
            let ticket = Ticket {
                priority,
                seq: state.next_seq,
            };
            state.next_seq += 1;
            state.waiting.push(ticket);
            ticket
        };
        debug!(priority = %priority, seq = ticket.seq, "Request queued");

        let mut waiter = Waiter {
            shared: &self.shared,
            ticket,
            admitted: false,
        };

        loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if waiter.try_admit() {
                debug!(priority = %priority, seq = ticket.seq, "Request admitted");
                return Permit {
                    shared: self.shared.clone(),
                };
            }
            notified.await;
        }
    }
}

/// Removes a ticket that is abandoned before admission.
struct Waiter<'a> {
    shared: &'a Shared,
    ticket: Ticket,
    admitted: bool,
}

impl Waiter<'_> {
    fn try_admit(&mut self) -> bool {
        let mut state = self.shared.state.lock();
        if state.in_flight < self.shared.capacity && state.waiting.peek() == Some(&self.ticket) {
            state.waiting.pop();
            state.in_flight += 1;
            self.admitted = true;
            // Another slot may still be free for the next waiter.
            self.shared.wake.notify_waiters();
            true
        } else {
            false
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.admitted {
            let ticket = self.ticket;
            self.shared.state.lock().waiting.retain(|t| *t != ticket);
            self.shared.wake.notify_waiters();
        }
    }
}

/// A held execution slot.
pub struct Permit {
    shared: Arc<Shared>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.shared.state.lock().in_flight -= 1;
        self.shared.wake.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for_waiting(dispatcher: &Dispatcher, n: usize) {
        while dispatcher.waiting() < n {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_ticket_order() {
        let mut heap = BinaryHeap::new();
        heap.push(Ticket { priority: Priority::Low, seq: 0 });
        heap.push(Ticket { priority: Priority::Critical, seq: 1 });
        heap.push(Ticket { priority: Priority::Normal, seq: 2 });
        heap.push(Ticket { priority: Priority::Critical, seq: 3 });

        let order: Vec<(Priority, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|t| (t.priority, t.seq))
            .collect();
        assert_eq!(
            order,
            vec![
                (Priority::Critical, 1),
                (Priority::Critical, 3),
                (Priority::Normal, 2),
                (Priority::Low, 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_immediate_admission_when_idle() {
        let dispatcher = Dispatcher::new(2);
        let a = dispatcher.acquire(Priority::Low).await;
        let b = dispatcher.acquire(Priority::Low).await;
        assert_eq!(dispatcher.in_flight(), 2);
        drop(a);
        drop(b);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_waiters_drain_by_priority() {
        let dispatcher = Dispatcher::new(1);
        let blocker = dispatcher.acquire(Priority::Normal).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for (i, priority) in [Priority::Low, Priority::Critical, Priority::Normal]
            .into_iter()
            .enumerate()
        {
            let d = dispatcher.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _permit = d.acquire(priority).await;
                order.lock().push(priority);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
            wait_for_waiting(&dispatcher, i + 1).await;
        }

        drop(blocker);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(
            *order.lock(),
            vec![Priority::Critical, Priority::Normal, Priority::Low]
        );
    }

    #[tokio::test]
    async fn test_fifo_within_tier() {
        let dispatcher = Dispatcher::new(1);
        let blocker = dispatcher.acquire(Priority::Critical).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3usize {
            let d = dispatcher.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _permit = d.acquire(Priority::High).await;
                order.lock().push(i);
            }));
            wait_for_waiting(&dispatcher, i + 1).await;
        }

        drop(blocker);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_is_removed() {
        let dispatcher = Dispatcher::new(1);
        let blocker = dispatcher.acquire(Priority::Normal).await;

        let d = dispatcher.clone();
        let pending = tokio::spawn(async move {
            let _permit = d.acquire(Priority::Critical).await;
        });
        wait_for_waiting(&dispatcher, 1).await;
        pending.abort();
        let _ = pending.await;
        assert_eq!(dispatcher.waiting(), 0);

        // A later low-priority request must not be stuck behind the ghost ticket.
        drop(blocker);
        let _permit = dispatcher.acquire(Priority::Low).await;
        assert_eq!(dispatcher.in_flight(), 1);
    }
}
