//! The per-handle lifecycle state machine shared by every async I/O handle:
//!
//! ```text
//! Fresh ──open/connect/accept──► Opening
//! Opening ──success──► Ready ──read|write──► Ready
//!         ──failure──► Errored (terminal)
//! Ready ──close──► Closing ──done──► Closed (terminal)
//! Any   ──owning handle drop──► Closing (auto) ──► Closed
//! ```

use parking_lot::Mutex;

use super::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Fresh,
    Opening,
    Ready,
    Closing,
    Closed,
    Errored,
}

impl HandleState {
    fn can_transition_to(self, next: HandleState) -> bool {
        use HandleState::*;
        matches!(
            (self, next),
            (Fresh, Opening)
                | (Opening, Ready)
                | (Opening, Errored)
                | (Ready, Ready)
                | (Ready, Closing)
                | (Fresh, Closing)
                | (Opening, Closing)
                | (Closing, Closed)
        )
    }
}

/// A `Mutex`-guarded `HandleState`, shared by every concrete handle type so
/// that concurrent calls from multiple threads on the same handle serialize
/// rather than race.
pub struct HandleStateCell {
    state: Mutex<HandleState>,
}

impl HandleStateCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HandleState::Fresh),
        }
    }

    pub fn get(&self) -> HandleState {
        *self.state.lock()
    }

    /// Attempt a transition, returning `RuntimeError::InvalidState` rather
    /// than panicking if the move is illegal from the current state.
    pub fn transition(&self, next: HandleState) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(RuntimeError::InvalidState(format!(
                "cannot move from {:?} to {:?}",
                *state, next
            )));
        }
        *state = next;
        Ok(())
    }

    /// True once the handle has reached a terminal state and further
    /// operations must short-circuit with `RuntimeError::Closed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.get(), HandleState::Closed | HandleState::Errored)
    }

    pub fn require_ready(&self) -> RuntimeResult<()> {
        match self.get() {
            HandleState::Ready => Ok(()),
            HandleState::Closed | HandleState::Closing | HandleState::Errored => {
                Err(RuntimeError::Closed)
            }
            other => Err(RuntimeError::InvalidState(format!(
                "handle not ready (state: {other:?})"
            ))),
        }
    }
}

impl Default for HandleStateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_documented_lifecycle() {
        let cell = HandleStateCell::new();
        assert_eq!(cell.get(), HandleState::Fresh);
        cell.transition(HandleState::Opening).unwrap();
        cell.transition(HandleState::Ready).unwrap();
        cell.require_ready().unwrap();
        cell.transition(HandleState::Closing).unwrap();
        cell.transition(HandleState::Closed).unwrap();
        assert!(cell.is_terminal());
    }

    #[test]
    fn rejects_illegal_transitions() {
        let cell = HandleStateCell::new();
        assert!(cell.transition(HandleState::Ready).is_err());
    }

    #[test]
    fn opening_can_fail_into_errored_terminal_state() {
        let cell = HandleStateCell::new();
        cell.transition(HandleState::Opening).unwrap();
        cell.transition(HandleState::Errored).unwrap();
        assert!(cell.is_terminal());
        assert!(cell.transition(HandleState::Ready).is_err());
    }

    #[test]
    fn require_ready_fails_once_closed() {
        let cell = HandleStateCell::new();
        cell.transition(HandleState::Opening).unwrap();
        cell.transition(HandleState::Ready).unwrap();
        cell.transition(HandleState::Closing).unwrap();
        cell.transition(HandleState::Closed).unwrap();
        assert!(matches!(cell.require_ready(), Err(RuntimeError::Closed)));
    }
}
