use std::collections::BTreeSet;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Orders a critical section across concurrently running files.
///
/// Turn `n` may enter only after every turn below `n` has been released,
/// either by finishing its section or by dropping its ticket unused.
#[derive(Debug, Default)]
pub struct TurnSequencer {
    state: Mutex<SequencerState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct SequencerState {
    next: usize,
    released: BTreeSet<usize>,
}

impl TurnSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for turn `turn`. Dropping it releases the turn.
    pub fn ticket(&self, turn: usize) -> TurnTicket<'_> {
        TurnTicket { sequencer: self, turn }
    }

    fn is_current(&self, turn: usize) -> bool {
        match self.state.lock() {
            Ok(state) => state.next == turn,
            Err(poisoned) => poisoned.into_inner().next == turn,
        }
    }

    async fn wait_for(&self, turn: usize) {
        loop {
            // Registered before the check so a release in between is not lost
            let notified = self.notify.notified();
            if self.is_current(turn) {
                return;
            }
            notified.await;
        }
    }

    fn release(&self, turn: usize) {
        {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.released.insert(turn);
            loop {
                let next = state.next;
                if !state.released.remove(&next) {
                    break;
                }
                state.next += 1;
            }
        }
        self.notify.notify_waiters();
    }
}

pub struct TurnTicket<'a> {
    sequencer: &'a TurnSequencer,
    turn: usize,
}

impl TurnTicket<'_> {
    /// Waits until every earlier turn has been released.
    pub async fn wait(&self) {
        self.sequencer.wait_for(self.turn).await;
    }
}

impl Drop for TurnTicket<'_> {
    fn drop(&mut self) {
        self.sequencer.release(self.turn);
    }
}
