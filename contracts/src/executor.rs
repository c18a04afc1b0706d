//! Single-writer execution.
//!
//! [`SerialExecutor`] is the ordered execution environment the ledger
//! assumes: a shareable handle that runs each submitted call to completion
//! under one lock, so the effects of call N are visible to call N + 1 and
//! no two calls interleave.

use parking_lot::Mutex;
use tracing::debug;

use crate::call::{CallOutcome, LedgerCall};
use crate::error::LedgerResult;
use crate::events::LedgerEvent;
use crate::ledger::{CallContext, ClearNet};

#[derive(Debug)]
pub struct SerialExecutor {
    ledger: Mutex<ClearNet>,
}

impl SerialExecutor {
    pub fn new(ledger: ClearNet) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// Applies `call` as `ctx.sender`.
    pub fn submit(&self, ctx: &CallContext, call: LedgerCall) -> LedgerResult<CallOutcome> {
        let name = call.name();
        let mut ledger = self.ledger.lock();
        let result = ledger.execute(ctx, call);
        debug!(call = name, sender = %ctx.sender, ok = result.is_ok(), "call executed");
        result
    }

    /// Runs a read against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&ClearNet) -> R) -> R {
        f(&self.ledger.lock())
    }

    /// Clone of the current state, for persistence.
    pub fn snapshot(&self) -> ClearNet {
        self.ledger.lock().clone()
    }

    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.ledger.lock().drain_events()
    }

    pub fn into_inner(self) -> ClearNet {
        self.ledger.into_inner()
    }
}
