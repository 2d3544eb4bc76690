//! Retransmission and timeout timer for client transactions
//!
//! One task runs per transaction. Over datagram transports it retransmits the
//! request the way RFC 3261 timers A and E do: first after T1, then doubling,
//! capped at T2 for non-INVITE requests. Once a provisional response has been
//! seen an INVITE is no longer retransmitted, while a non-INVITE request keeps
//! going at T2. On every transport the transaction fails with
//! [`DialogError::Timeout`](crate::errors::DialogError::Timeout) after 64*T1
//! (timers B and F) unless it is an INVITE that is already proceeding.
//!
//! The task only holds a weak reference to its dialog and is aborted when the
//! transaction completes.

use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::config::TimerSettings;
use crate::dialog::{Dialog, WeakDialog};
use crate::transaction::{TransactionId, TransactionState};

/// Start the timer for a transaction that was just sent
pub(crate) fn spawn(dialog: &Dialog, id: TransactionId, invite: bool) -> AbortHandle {
    let settings = dialog.config().timers;
    let retransmit = !dialog.connection().transport_kind().is_reliable();
    let weak = dialog.downgrade();

    tokio::spawn(run(weak, id, settings, retransmit, invite)).abort_handle()
}

async fn run(dialog: WeakDialog, id: TransactionId, settings: TimerSettings, retransmit: bool, invite: bool) {
    let deadline = Instant::now() + settings.transaction_timeout();
    let mut interval = settings.t1;
    let mut next_send = retransmit.then(|| Instant::now() + interval);

    loop {
        let wake = match next_send {
            Some(at) if at < deadline => at,
            _ => deadline,
        };
        sleep_until(wake).await;

        let Some(dialog) = dialog.upgrade() else {
            return;
        };

        if wake >= deadline {
            dialog.expire_transaction(id);
            return;
        }

        let Some((request, state)) = dialog.pending_request(id) else {
            return;
        };

        if invite && state == TransactionState::Proceeding {
            next_send = None;
            continue;
        }

        interval = next_interval(interval, settings, invite, state);
        trace!(transaction = %id, method = %request.method, cseq = request.cseq, "Retransmitting request");
        if let Err(e) = dialog.connection().send_message(request.into()).await {
            debug!(transaction = %id, "Retransmission failed: {}", e);
        }
        next_send = Some(wake + interval);
    }
}

fn next_interval(current: Duration, settings: TimerSettings, invite: bool, state: TransactionState) -> Duration {
    if state == TransactionState::Proceeding {
        settings.t2
    } else if invite {
        current * 2
    } else {
        (current * 2).min(settings.t2)
    }
}
