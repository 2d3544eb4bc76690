//! Awaitable side of a transaction

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use sipline_sip_core::Response;
use tokio::sync::oneshot;

use crate::dialog::WeakDialog;
use crate::errors::{DialogError, DialogResult};
use crate::transaction::{TransactionId, TransactionKey};

/// Pending result of a request sent through a dialog
///
/// Resolves with the final response, or with the error that completed the
/// transaction (timeout, authentication failure, teardown, cancellation).
///
/// ```rust,no_run
/// # use sipline_dialog_core::prelude::*;
/// # async fn example(dialog: Dialog) -> DialogResult<()> {
/// let handle = dialog.register(None, None).await?;
/// let response = handle.await?;
/// println!("registered: {} {}", response.status_code, response.reason);
/// # Ok(())
/// # }
/// ```
pub struct TransactionHandle {
    id: TransactionId,
    key: TransactionKey,
    receiver: oneshot::Receiver<DialogResult<Response>>,
    dialog: WeakDialog,
}

impl TransactionHandle {
    pub(crate) fn new(
        id: TransactionId,
        key: TransactionKey,
        receiver: oneshot::Receiver<DialogResult<Response>>,
        dialog: WeakDialog,
    ) -> Self {
        Self {
            id,
            key,
            receiver,
            dialog,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Key of the request as first sent
    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    /// Cancel the transaction
    ///
    /// The handle then resolves with [`DialogError::Cancelled`]. An INVITE
    /// is also cancelled on the wire with a CANCEL request. Cancelling a
    /// transaction that already completed does nothing.
    pub async fn cancel(&self) -> DialogResult<()> {
        match self.dialog.upgrade() {
            Some(dialog) => dialog.cancel_transaction(self.id).await,
            None => Ok(()),
        }
    }
}

impl Future for TransactionHandle {
    type Output = DialogResult<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the dialog went away without tearing down
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DialogError::Aborted)))
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}
