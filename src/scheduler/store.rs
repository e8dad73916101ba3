//! Waitable ready store
//!
//! Holds processes awaiting service and lets one activity suspend until a
//! process is available. The store is emptied in place on a catastrophe so
//! a consumer already suspended in [`ReadyStore::get`] keeps waiting on the
//! same store. [`ReadyStore::notify`] releases a suspended consumer empty-handed
//! so it can re-check state that is not the store's own.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::runtime::{Resumed, Sim, TaskId};
use crate::types::Process;

/// Process keyed by its initial demand; shorter first, then insertion order
struct ByDemand {
    seq: u64,
    process: Process,
}

impl PartialEq for ByDemand {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ByDemand {}

impl PartialOrd for ByDemand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByDemand {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .process
            .initial_demand()
            .total_cmp(&self.process.initial_demand())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Items {
    Fifo(VecDeque<Process>),
    ShortestFirst { heap: BinaryHeap<ByDemand>, next_seq: u64 },
}

impl Items {
    fn len(&self) -> usize {
        match self {
            Items::Fifo(queue) => queue.len(),
            Items::ShortestFirst { heap, .. } => heap.len(),
        }
    }

    fn push(&mut self, process: Process) {
        match self {
            Items::Fifo(queue) => queue.push_back(process),
            Items::ShortestFirst { heap, next_seq } => {
                heap.push(ByDemand { seq: *next_seq, process });
                *next_seq += 1;
            }
        }
    }

    fn pop(&mut self) -> Option<Process> {
        match self {
            Items::Fifo(queue) => queue.pop_front(),
            Items::ShortestFirst { heap, .. } => heap.pop().map(|entry| entry.process),
        }
    }

    fn clear(&mut self) {
        match self {
            Items::Fifo(queue) => queue.clear(),
            Items::ShortestFirst { heap, .. } => heap.clear(),
        }
    }
}

struct StoreState {
    items: Items,
    getters: VecDeque<TaskId>,
    notified: bool,
}

pub struct ReadyStore {
    sim: Sim,
    state: RefCell<StoreState>,
}

impl ReadyStore {
    /// Arrival-ordered store
    pub fn fifo(sim: Sim) -> Self {
        Self::with_items(sim, Items::Fifo(VecDeque::new()))
    }

    /// Store ordered by initial demand, ties by arrival
    pub fn shortest_first(sim: Sim) -> Self {
        Self::with_items(
            sim,
            Items::ShortestFirst { heap: BinaryHeap::new(), next_seq: 0 },
        )
    }

    fn with_items(sim: Sim, items: Items) -> Self {
        ReadyStore {
            sim,
            state: RefCell::new(StoreState { items, getters: VecDeque::new(), notified: false }),
        }
    }

    /// Add a process and wake the longest-waiting consumer
    pub fn put(&self, process: Process) {
        let getter = {
            let mut state = self.state.borrow_mut();
            state.items.push(process);
            state.getters.front().copied()
        };
        if let Some(task) = getter {
            self.sim.wake(task);
        }
    }

    /// Wake the longest-waiting consumer without a process.
    ///
    /// Its pending [`get`](Self::get) resolves to `Ok(None)`. Does nothing
    /// when no consumer is suspended.
    pub fn notify(&self) {
        let getter = {
            let mut state = self.state.borrow_mut();
            let getter = state.getters.front().copied();
            state.notified |= getter.is_some();
            getter
        };
        if let Some(task) = getter {
            self.sim.wake(task);
        }
    }

    /// Suspend until a process is available or a [`notify`](Self::notify)
    pub fn get(&self) -> Get<'_> {
        Get { store: self, registered: None }
    }

    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored process, returning how many there were
    pub fn clear(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    fn unregister(&self, task: TaskId) {
        self.state.borrow_mut().getters.retain(|id| *id != task);
    }
}

/// Pending [`ReadyStore::get`]
pub struct Get<'a> {
    store: &'a ReadyStore,
    registered: Option<TaskId>,
}

impl Get<'_> {
    fn finish<T>(&mut self, outcome: T) -> Poll<T> {
        if let Some(task) = self.registered.take() {
            self.store.unregister(task);
        }
        self.store.state.borrow_mut().notified = false;
        Poll::Ready(outcome)
    }
}

impl Future for Get<'_> {
    type Output = Resumed<Option<Process>>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(interrupt) = this.store.sim.take_interrupt() {
            return this.finish(Err(interrupt));
        }

        let (next, notified) = {
            let mut state = this.store.state.borrow_mut();
            (state.items.pop(), state.notified)
        };
        if let Some(process) = next {
            return this.finish(Ok(Some(process)));
        }
        if notified && this.registered.is_some() {
            return this.finish(Ok(None));
        }

        if this.registered.is_none() {
            let task = this.store.sim.current_task();
            this.store.state.borrow_mut().getters.push_back(task);
            this.registered = Some(task);
        }
        Poll::Pending
    }
}

impl Drop for Get<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.registered.take() {
            self.store.unregister(task);
        }
    }
}
