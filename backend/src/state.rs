//! Connection lifecycle
//!
//! `Closed -> Opening -> Open -> Closing -> Closed`. `Closed` is both the initial
//! and the terminal state; a closed owner refuses to reopen once its shutdown flag
//! is set.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Opening,
            2 => LifecycleState::Open,
            3 => LifecycleState::Closing,
            _ => LifecycleState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LifecycleState::Closed => 0,
            LifecycleState::Opening => 1,
            LifecycleState::Open => 2,
            LifecycleState::Closing => 3,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Closed => "closed",
            LifecycleState::Opening => "opening",
            LifecycleState::Open => "open",
            LifecycleState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Lock-free holder of a [`LifecycleState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Closed.as_u8()))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: LifecycleState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `from` to `to`; false when the current state is not `from`
    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
