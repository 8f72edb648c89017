//! The transaction state machine (§4.1).

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Start,
    PreWriteStart,
    PreWritePrimaryKey,
    PreWrite,
    PreWriteFail,
    CommitPrimaryKey,
    Commit,
    CommitFail,
    Rollback,
    RollbackFail,
    Cancel,
    Close,
}

/// The events that drive transitions. Named after the call that triggers them rather
/// than the destination state, since a couple of events (`WriteConflict`, `Cancel`)
/// branch to different destinations depending on the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    BeginPreWrite,
    PrimaryKeyPrewritten,
    SecondariesPrewritten,
    PreWriteFailed,
    PrimaryKeyCommitted,
    Committed,
    CommitFailed,
    RollbackStarted,
    RollbackFailed,
    Cancelled,
    Closed,
}

impl Status {
    /// Validates and applies one state transition. Illegal transitions return
    /// `Error::TransactionState` rather than panicking (§4.1: "no transition is
    /// skipped" is enforced here, not by trusting callers).
    pub fn transition(self, event: Event) -> Result<Status> {
        use Event::*;
        use Status::*;

        // `cancel()` can fire from any state except `Close`, short-circuiting to
        // `Cancel` regardless of where the txn currently is.
        if event == Cancelled {
            return if self == Close {
                Err(Error::TransactionState("cannot cancel a closed transaction"))
            } else {
                Ok(Cancel)
            };
        }

        // `commit()`/`rollback()` are idempotent once closed (§4.1).
        if self == Close && matches!(event, Committed | RollbackStarted) {
            return Ok(Close);
        }

        let next = match (self, event) {
            (Start, BeginPreWrite) => PreWriteStart,
            (PreWriteStart, PrimaryKeyPrewritten) => PreWritePrimaryKey,
            (PreWritePrimaryKey, SecondariesPrewritten) => PreWrite,

            (PreWriteStart, PreWriteFailed)
            | (PreWritePrimaryKey, PreWriteFailed)
            | (PreWrite, PreWriteFailed) => PreWriteFail,
            (PreWriteFail, RollbackStarted) => Rollback,

            (PreWrite, PrimaryKeyCommitted) => CommitPrimaryKey,
            (CommitPrimaryKey, Committed) => Commit,
            (CommitPrimaryKey, CommitFailed) => CommitFail,
            (CommitFail, RollbackStarted) => Rollback,

            (Cancel, RollbackStarted) => Rollback,
            (Rollback, RollbackFailed) => RollbackFail,

            (Commit, Closed) => Close,
            (Rollback, Closed) => Close,
            (RollbackFail, Closed) => Close,
            // An empty mutation buffer makes prewrite a no-op commit: status stays
            // `Start` (§4.1) and `close()` may be called directly from there.
            (Start, Closed) => Close,

            (state, event) => {
                return Err(Error::TransactionState(illegal_transition_message(state, event)));
            }
        };
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Close)
    }

    pub fn is_committed(self) -> bool {
        matches!(self, Status::Commit | Status::Close)
    }
}

fn illegal_transition_message(state: Status, event: Event) -> &'static str {
    match (state, event) {
        (Status::Close, _) => "transaction already closed",
        _ => "illegal transaction state transition",
    }
}
