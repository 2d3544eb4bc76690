//! Client transactions
//!
//! A [`Transaction`] tracks one outbound request from the moment it is sent
//! until a final response, an error or a teardown completes it. Completion is
//! delivered exactly once through a oneshot channel to the
//! [`TransactionHandle`] the caller awaits.
//!
//! ```text
//!            1xx                final / error / cancel
//! Pending ─────────▶ Proceeding ─────────────────────▶ Resolved | Failed | Cancelled
//!    │                                                        ▲
//!    └────────────────────────────────────────────────────────┘
//! ```
//!
//! The owning [`Dialog`](crate::dialog::Dialog) keeps non-terminal transactions
//! in a table keyed by [`TransactionKey`] and removes them on every terminal
//! transition.

pub mod handle;
pub mod timer;

use std::fmt;

use sipline_sip_core::{Method, Request, Response};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::trace;
use uuid::Uuid;

use crate::errors::{DialogError, DialogResult};

pub use handle::TransactionHandle;

pub(crate) type Completion = oneshot::Sender<DialogResult<Response>>;

/// `(method, cseq)` pair a response is matched on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub method: Method,
    pub cseq: u32,
}

impl TransactionKey {
    pub fn new(method: Method, cseq: u32) -> Self {
        Self { method, cseq }
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cseq, self.method)
    }
}

/// Stable identity of a transaction
///
/// Unlike the key, the id survives an authentication re-send that moves the
/// transaction to a new CSeq.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Sent, nothing heard yet
    Pending,
    /// A provisional response arrived
    Proceeding,
    /// Completed with a final response
    Resolved,
    /// Completed with an error
    Failed,
    /// Completed by the caller
    Cancelled,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Resolved | TransactionState::Failed | TransactionState::Cancelled
        )
    }
}

/// What the dialog has to do after a response was fed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FeedOutcome {
    /// Provisional response, keep waiting
    Proceeding,
    /// The transaction reached a terminal state
    Completed,
    /// The request has to be re-sent with credentials for `authenticate`
    Challenged { authenticate: String, proxy: bool },
}

pub(crate) struct Transaction {
    id: TransactionId,
    key: TransactionKey,
    request: Request,
    state: TransactionState,
    completion: Option<Completion>,
    timer: Option<AbortHandle>,
    auth_attempts_left: u32,
}

impl Transaction {
    pub(crate) fn new(request: Request, completion: Completion, auth_attempts: u32) -> Self {
        Self {
            id: TransactionId::new(),
            key: TransactionKey::new(request.method.clone(), request.cseq),
            request,
            state: TransactionState::Pending,
            completion: Some(completion),
            timer: None,
            auth_attempts_left: auth_attempts,
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn key(&self) -> &TransactionKey {
        &self.key
    }

    pub(crate) fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn is_invite(&self) -> bool {
        self.key.method == Method::Invite
    }

    pub(crate) fn set_timer(&mut self, timer: AbortHandle) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Move to the transaction that re-sends `request` after a challenge
    ///
    /// The id, the completion and the remaining attempt budget carry over.
    pub(crate) fn reissue(mut self, request: Request) -> Transaction {
        self.stop_timer();
        Transaction {
            id: self.id,
            key: TransactionKey::new(request.method.clone(), request.cseq),
            request,
            state: TransactionState::Pending,
            completion: self.completion.take(),
            timer: None,
            auth_attempts_left: self.auth_attempts_left,
        }
    }

    pub(crate) fn feed_message(&mut self, response: &Response, has_password: bool) -> FeedOutcome {
        // Late response to a transaction that already finished
        if self.state.is_terminal() {
            return FeedOutcome::Completed;
        }

        if response.is_provisional() {
            self.state = TransactionState::Proceeding;
            return FeedOutcome::Proceeding;
        }

        let challenge = match response.status_code {
            401 => response.headers.get("WWW-Authenticate").map(|h| (h, false)),
            407 => response.headers.get("Proxy-Authenticate").map(|h| (h, true)),
            _ => None,
        };

        if let Some((authenticate, proxy)) = challenge {
            if !has_password {
                self.complete(Err(DialogError::PasswordRequired));
                return FeedOutcome::Completed;
            }

            self.auth_attempts_left = self.auth_attempts_left.saturating_sub(1);
            if self.auth_attempts_left == 0 {
                self.complete(Err(DialogError::AuthenticationFailed {
                    method: self.key.method.clone(),
                }));
                return FeedOutcome::Completed;
            }

            return FeedOutcome::Challenged {
                authenticate: authenticate.to_string(),
                proxy,
            };
        }

        self.complete(Ok(response.clone()));
        FeedOutcome::Completed
    }

    /// Deliver the outcome; returns `false` when already completed
    pub(crate) fn complete(&mut self, result: DialogResult<Response>) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        self.state = match &result {
            Ok(_) => TransactionState::Resolved,
            Err(DialogError::Cancelled) => TransactionState::Cancelled,
            Err(_) => TransactionState::Failed,
        };
        self.stop_timer();

        trace!(transaction = %self.id, key = %self.key, state = ?self.state, "Transaction completed");
        if let Some(completion) = self.completion.take() {
            // The caller may have dropped its handle
            let _ = completion.send(result);
        }
        true
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state)
            .field("auth_attempts_left", &self.auth_attempts_left)
            .finish_non_exhaustive()
    }
}
