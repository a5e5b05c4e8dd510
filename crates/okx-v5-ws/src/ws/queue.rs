/*
[INPUT]:  Control operations (login, subscribe, unsubscribe) as futures
[OUTPUT]: Strictly sequential execution, one operation in flight at a time
[POS]:    WebSocket layer - single-flight operation queue
[UPDATE]: When adding queued operation kinds or changing reset semantics
*/

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

/// Control operation kinds that go through the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Login,
    Subscribe,
    Unsubscribe,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Login => "login",
            OperationKind::Subscribe => "subscribe",
            OperationKind::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct QueueEntry {
    seq: u64,
    kind: OperationKind,
    /// Fired when this entry reaches the head
    turn: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    next_seq: u64,
    epoch: u64,
}

impl QueueState {
    /// Hand the turn to whichever entry now sits at the head
    fn wake_head(&mut self) {
        if let Some(head) = self.entries.front_mut()
            && let Some(turn) = head.turn.take()
        {
            let _ = turn.send(());
        }
    }
}

/// FIFO of control operations. The next entry starts only after the
/// previous one settled, because replies to these operations carry no id.
#[derive(Debug, Clone, Default)]
pub struct OperationQueue {
    state: Arc<Mutex<QueueState>>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `work` once every earlier entry has settled.
    ///
    /// If the queue is cleared while this entry is still waiting for its turn,
    /// the returned future never completes.
    pub async fn enqueue<T, F>(&self, kind: OperationKind, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let (slot, turn) = {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            let slot = Slot {
                queue: self.clone(),
                seq,
                epoch: state.epoch,
            };
            if state.entries.is_empty() {
                state.entries.push_back(QueueEntry {
                    seq,
                    kind,
                    turn: None,
                });
                (slot, None)
            } else {
                let (tx, rx) = oneshot::channel();
                state.entries.push_back(QueueEntry {
                    seq,
                    kind,
                    turn: Some(tx),
                });
                (slot, Some(rx))
            }
        };

        if let Some(turn) = turn
            && turn.await.is_err()
        {
            // dropped by `clear`, this entry belongs to a finished epoch
            std::future::pending::<()>().await;
        }

        let output = work.await;
        drop(slot);
        output
    }

    /// Kind of the oldest outstanding operation
    pub fn head_kind(&self) -> Option<OperationKind> {
        self.lock().entries.front().map(|entry| entry.kind)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop every entry and start a new epoch
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.epoch += 1;
    }
}

/// Removes its entry when the operation settles or its caller goes away
struct Slot {
    queue: OperationQueue,
    seq: u64,
    epoch: u64,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut state = self.queue.lock();
        if state.epoch != self.epoch {
            return;
        }
        let Some(index) = state.entries.iter().position(|entry| entry.seq == self.seq) else {
            return;
        };
        state.entries.remove(index);
        if index == 0 {
            state.wake_head();
        }
    }
}
