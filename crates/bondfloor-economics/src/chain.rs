//! Shared handle to a running protocol.
//!
//! A [`Chain`] serialises every write through one lock and stamps each block
//! with the time from its [`Clock`], so concurrent callers see the same
//! ordering a single block producer would. Reads take a shared lock or a
//! cloned snapshot.

use crate::clock::Clock;
use crate::error::Result;
use crate::protocol::Protocol;
use crate::types::Timestamp;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

#[derive(Clone)]
pub struct Chain {
    state: Arc<RwLock<Protocol>>,
    clock: Arc<dyn Clock>,
}

impl Chain {
    pub fn new(protocol: Protocol, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(protocol)),
            clock,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run `call` in the next block.
    ///
    /// The block time is taken from the clock before the call runs. Calls
    /// on [`Protocol`] are themselves all-or-nothing, so an error here
    /// leaves the state as it was apart from the advanced block time.
    pub fn submit<T>(&self, call: impl FnOnce(&mut Protocol) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let now = self.clock.now();
        state.set_time(now);
        trace!(block_time = state.now(), "block");
        call(&mut state)
    }

    /// Read the live state under a shared lock
    pub fn read<T>(&self, view: impl FnOnce(&Protocol) -> T) -> T {
        view(&self.state.read())
    }

    /// Owned copy of the current state
    pub fn snapshot(&self) -> Protocol {
        self.state.read().clone()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}
