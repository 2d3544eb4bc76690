//! Dialog implementation
//!
//! Contains the [`Dialog`] handle and its request/response processing.
//!
//! All mutable dialog state lives behind one `parking_lot` mutex. The lock is
//! only taken for bookkeeping and is always released before a message is put
//! on the wire, so no critical section spans an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sipline_auth_core::{Challenge, Credentials};
use sipline_sip_core::{generate_branch, Contact, Headers, Method, Request, Response, SipMessage};

use crate::app::DialogParams;
use crate::config::DialogConfig;
use crate::connection::Connection;
use crate::dialog::{Callback, OutboundRequest};
use crate::errors::{DialogError, DialogResult};
use crate::routing::Router;
use crate::transaction::{
    timer, FeedOutcome, Transaction, TransactionHandle, TransactionId, TransactionKey, TransactionState,
};

/// A SIP dialog bound to one Call-ID on one connection
///
/// `Dialog` is a cheap handle; clones refer to the same dialog.
#[derive(Clone)]
pub struct Dialog {
    inner: Arc<DialogInner>,
}

struct DialogInner {
    call_id: String,
    connection: Connection,
    config: Arc<DialogConfig>,
    password: Option<String>,
    router: Router,
    state: Mutex<DialogState>,
}

struct DialogState {
    from: Contact,
    to: Contact,
    contact: Contact,
    cseq: u32,
    transactions: HashMap<TransactionKey, Transaction>,
    callbacks: HashMap<String, Vec<Callback>>,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl DialogState {
    fn take_transaction(&mut self, id: TransactionId) -> Option<Transaction> {
        let key = self
            .transactions
            .iter()
            .find(|(_, transaction)| transaction.id() == id)
            .map(|(key, _)| key.clone())?;
        self.transactions.remove(&key)
    }
}

/// Non-owning reference used by timers and transaction handles
#[derive(Clone)]
pub(crate) struct WeakDialog(Weak<DialogInner>);

impl WeakDialog {
    pub(crate) fn upgrade(&self) -> Option<Dialog> {
        self.0.upgrade().map(|inner| Dialog { inner })
    }
}

// Outgoing message plus the transaction to fail if sending it fails
type Outgoing = (Request, Option<TransactionId>);

impl Dialog {
    /// Build a dialog from factory parameters
    ///
    /// The contact defaults to the from URI (without its tag).
    pub fn new(params: DialogParams) -> DialogResult<Self> {
        let from = Contact::from_header(&params.from_uri)?;
        let to = Contact::from_header(&params.to_uri)?;
        let mut contact = match &params.contact_uri {
            Some(uri) => Contact::from_header(uri)?,
            None => from.clone(),
        };
        contact.params.retain(|(name, _)| !name.eq_ignore_ascii_case("tag"));

        debug!(call_id = %params.call_id, from = %from, to = %to, "Creating dialog");

        Ok(Self {
            inner: Arc::new(DialogInner {
                call_id: params.call_id,
                connection: params.connection,
                config: params.app.config(),
                password: params.password,
                router: params.router,
                state: Mutex::new(DialogState {
                    from,
                    to,
                    contact,
                    cseq: params.cseq,
                    transactions: HashMap::new(),
                    callbacks: HashMap::new(),
                    tasks: Vec::new(),
                    closed: false,
                }),
            }),
        })
    }

    pub fn call_id(&self) -> &str {
        &self.inner.call_id
    }

    /// CSeq of the last request sent
    pub fn cseq(&self) -> u32 {
        self.inner.state.lock().cseq
    }

    pub fn from_details(&self) -> Contact {
        self.inner.state.lock().from.clone()
    }

    pub fn to_details(&self) -> Contact {
        self.inner.state.lock().to.clone()
    }

    pub fn contact_details(&self) -> Contact {
        self.inner.state.lock().contact.clone()
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn config(&self) -> &DialogConfig {
        &self.inner.config
    }

    /// Number of transactions still waiting for completion
    pub fn pending_transactions(&self) -> usize {
        self.inner.state.lock().transactions.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Whether both handles refer to the same dialog
    pub fn same_as(&self, other: &Dialog) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakDialog {
        WeakDialog(Arc::downgrade(&self.inner))
    }

    /// Send a request
    ///
    /// Every method but ACK is tracked by a transaction and returns its
    /// handle; ACK is sent as is and returns `None`.
    pub async fn send(&self, request: OutboundRequest) -> DialogResult<Option<TransactionHandle>> {
        let (request, handle) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(DialogError::DialogClosed);
            }

            let request = self.build_request(&mut state, request);
            if request.method == Method::Ack {
                (request, None)
            } else {
                let (tx, rx) = oneshot::channel();
                let transaction = Transaction::new(request.clone(), tx, self.inner.config.auth_attempts);
                let handle = TransactionHandle::new(
                    transaction.id(),
                    transaction.key().clone(),
                    rx,
                    self.downgrade(),
                );
                self.track_transaction(&mut state, transaction);
                (request, Some(handle))
            }
        };

        debug!(call_id = %self.inner.call_id, method = %request.method, cseq = request.cseq, "Sending request");
        if let Err(error) = self.inner.connection.send_message(request.into()).await {
            if let Some(handle) = &handle {
                self.fail_transaction(handle.id(), error.clone());
            }
            return Err(error);
        }

        Ok(handle)
    }

    /// Send a request that is always transaction tracked
    async fn send_tracked(&self, request: OutboundRequest) -> DialogResult<TransactionHandle> {
        self.send(request)
            .await?
            .ok_or_else(|| DialogError::internal("tracked request returned no transaction"))
    }

    /// Send a REGISTER
    ///
    /// `Allow`, `Allow-Events` and `Expires` are filled in unless `headers`
    /// carries them; `expires` defaults to the configured value.
    pub async fn register(&self, headers: Option<Headers>, expires: Option<u32>) -> DialogResult<TransactionHandle> {
        let mut headers = headers.unwrap_or_default();
        let config = &self.inner.config;
        headers.insert_default("Allow", config.allow.clone());
        headers.insert_default("Expires", expires.unwrap_or(config.register_expires).to_string());
        headers.insert_default("Allow-Events", config.allow_events.clone());

        let request = OutboundRequest::new(Method::Register)
            .with_headers(headers)
            .with_payload("");
        self.send_tracked(request).await
    }

    /// Send an INVITE, with an SDP offer when given
    pub async fn invite(&self, headers: Option<Headers>, sdp: Option<String>) -> DialogResult<TransactionHandle> {
        let mut request = OutboundRequest::new(Method::Invite).with_headers(headers.unwrap_or_default());
        if let Some(sdp) = sdp {
            request = request.with_body("application/sdp", sdp);
        }
        self.send_tracked(request).await
    }

    /// Send a SUBSCRIBE with the given expiry
    pub async fn subscribe(&self, headers: Option<Headers>, expires: u32) -> DialogResult<TransactionHandle> {
        let mut headers = headers.unwrap_or_default();
        headers.insert_default("Expires", expires.to_string());

        let request = OutboundRequest::new(Method::Subscribe).with_headers(headers);
        self.send_tracked(request).await
    }

    /// Send a NOTIFY carrying `payload`
    pub async fn notify(&self, headers: Option<Headers>, payload: impl Into<String>) -> DialogResult<TransactionHandle> {
        let request = OutboundRequest::new(Method::Notify)
            .with_headers(headers.unwrap_or_default())
            .with_payload(payload);
        self.send_tracked(request).await
    }

    /// Send a response in this dialog
    ///
    /// The To identity gets this dialog's local tag when it has none.
    /// Replies are never transaction tracked.
    pub async fn reply(&self, mut response: Response) -> DialogResult<()> {
        if response.to.tag().is_none() {
            let tag = self.inner.state.lock().from.ensure_tag().to_string();
            response.to.set_tag(tag);
        }
        response.headers.insert("Call-ID", self.inner.call_id.clone());

        debug!(call_id = %self.inner.call_id, status = response.status_code, cseq = response.cseq, "Sending response");
        self.inner.connection.send_message(response.into()).await
    }

    /// Process a message routed to this dialog
    ///
    /// A response completes or advances its transaction; one without a
    /// pending transaction is reported as [`DialogError::UnmatchedResponse`].
    /// A request other than ACK is answered with `200 OK`, then every
    /// handler registered for its method is dispatched.
    pub async fn receive_message(&self, message: SipMessage) -> DialogResult<()> {
        match message {
            SipMessage::Response(response) => self.receive_response(response).await,
            SipMessage::Request(request) => self.receive_request(request).await,
        }
    }

    async fn receive_response(&self, response: Response) -> DialogResult<()> {
        let key = TransactionKey::new(response.method.clone(), response.cseq);

        let outgoing = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(DialogError::DialogClosed);
            }

            let Some(transaction) = state.transactions.get_mut(&key) else {
                return Err(DialogError::UnmatchedResponse {
                    method: key.method,
                    cseq: key.cseq,
                });
            };

            debug!(call_id = %self.inner.call_id, status = response.status_code, key = %key, "Received response");
            match transaction.feed_message(&response, self.inner.password.is_some()) {
                FeedOutcome::Proceeding => Vec::new(),
                FeedOutcome::Completed => {
                    let mut outgoing = Vec::new();
                    if let Some(transaction) = state.transactions.remove(&key) {
                        if transaction.is_invite() {
                            outgoing.push((self.build_ack(transaction.request(), &response), None));
                        }
                    }
                    outgoing
                }
                FeedOutcome::Challenged { authenticate, proxy } => {
                    self.prepare_auth_retry(&mut state, &key, &response, &authenticate, proxy)
                }
            }
        };

        self.send_outgoing(outgoing).await;
        Ok(())
    }

    async fn receive_request(&self, request: Request) -> DialogResult<()> {
        if self.is_closed() {
            return Err(DialogError::DialogClosed);
        }
        debug!(call_id = %self.inner.call_id, method = %request.method, cseq = request.cseq, "Received request");

        if request.method != Method::Ack {
            let mut headers = Headers::new();
            for via in request.headers.get_all("Via") {
                headers.append("Via", via);
            }
            let response = Response::from_request(&request, 200, "OK", headers);
            self.reply(response).await?;
        }

        self.dispatch_callbacks(request);
        Ok(())
    }

    /// Register `callback` for requests of `method`
    ///
    /// Methods match case-insensitively. Registering the same callback twice
    /// makes it run twice per request.
    pub fn register_callback(&self, method: &str, callback: Callback) {
        self.inner
            .state
            .lock()
            .callbacks
            .entry(method.to_ascii_uppercase())
            .or_default()
            .push(callback);
    }

    /// Remove every registration of `callback` for `method`
    pub fn unregister_callback(&self, method: &str, callback: &Callback) {
        let mut state = self.inner.state.lock();
        if let Some(callbacks) = state.callbacks.get_mut(&method.to_ascii_uppercase()) {
            callbacks.retain(|registered| !registered.same_as(callback));
        }
    }

    /// How many times `callback` is registered for `method`
    pub fn is_callback_registered(&self, method: &str, callback: &Callback) -> usize {
        self.inner
            .state
            .lock()
            .callbacks
            .get(&method.to_ascii_uppercase())
            .map_or(0, |callbacks| callbacks.iter().filter(|c| c.same_as(callback)).count())
    }

    /// Close the dialog
    ///
    /// Deregisters from the connection, fails every pending transaction with
    /// [`DialogError::Aborted`] and aborts all handler tasks. Idempotent.
    pub fn close(&self) {
        if self.teardown(DialogError::Aborted) {
            self.inner.connection.release_dialog(self);
            info!(call_id = %self.inner.call_id, "Dialog closed");
        }
    }

    /// The connection went away
    ///
    /// Fails every pending transaction with [`DialogError::ConnectionLost`]
    /// and aborts all handler tasks; the connection clears its own registry.
    pub fn connection_lost(&self) {
        if self.teardown(DialogError::ConnectionLost) {
            warn!(call_id = %self.inner.call_id, "Dialog lost its connection");
        }
    }

    fn teardown(&self, error: DialogError) -> bool {
        let (transactions, tasks) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            let transactions: Vec<Transaction> = state.transactions.drain().map(|(_, t)| t).collect();
            (transactions, std::mem::take(&mut state.tasks))
        };

        debug!(
            call_id = %self.inner.call_id,
            transactions = transactions.len(),
            tasks = tasks.len(),
            "Tearing down dialog: {}", error
        );
        for mut transaction in transactions {
            transaction.complete(Err(error.clone()));
        }
        for task in tasks {
            task.abort();
        }
        true
    }

    fn dispatch_callbacks(&self, request: Request) {
        let callbacks = self
            .inner
            .state
            .lock()
            .callbacks
            .get(&request.method.as_str().to_ascii_uppercase())
            .cloned()
            .unwrap_or_default();
        if callbacks.is_empty() {
            return;
        }

        let dialog = self.clone();
        self.spawn_tracked(async move {
            for callback in callbacks {
                if let Some(future) = callback.invoke(&dialog, &request) {
                    let call_id = dialog.inner.call_id.clone();
                    let method = request.method.clone();
                    dialog.spawn_tracked(async move {
                        if let Err(e) = future.await {
                            warn!(call_id = %call_id, method = %method, "Request handler failed: {}", e);
                        }
                    });
                }
            }
        });
    }

    /// Spawn a task that is aborted when the dialog closes
    ///
    /// Returns `false` without spawning once the dialog is closed.
    pub fn spawn_tracked<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.closed {
            return false;
        }
        state.tasks.retain(|task| !task.is_finished());
        state.tasks.push(tokio::spawn(future));
        true
    }

    fn build_request(&self, state: &mut DialogState, request: OutboundRequest) -> Request {
        let OutboundRequest {
            method,
            to,
            from,
            contact,
            mut headers,
            content_type,
            payload,
        } = request;

        headers.insert_default("Call-ID", self.inner.call_id.clone());
        let from = match from {
            Some(mut from) => {
                from.ensure_tag();
                from
            }
            None => {
                state.from.ensure_tag();
                state.from.clone()
            }
        };
        let to = to.unwrap_or_else(|| state.to.clone());

        state.cseq += 1;
        let mut request = Request::new(method, to.uri.clone(), from, to, state.cseq);
        request.contact = Some(contact.unwrap_or_else(|| state.contact.clone()));
        self.stamp_headers(&mut headers);
        request.headers = headers;
        request.content_type = content_type;
        request.payload = payload.unwrap_or_default();
        request
    }

    fn stamp_headers(&self, headers: &mut Headers) {
        let connection = &self.inner.connection;
        headers.insert_default(
            "Via",
            format!(
                "SIP/2.0/{} {};branch={}",
                connection.transport_kind(),
                connection.local_addr(),
                generate_branch()
            ),
        );
        headers.insert_default("Max-Forwards", self.inner.config.max_forwards.to_string());
        if let Some(user_agent) = &self.inner.config.user_agent {
            headers.insert_default("User-Agent", user_agent.clone());
        }
    }

    fn track_transaction(&self, state: &mut DialogState, mut transaction: Transaction) {
        transaction.set_timer(timer::spawn(self, transaction.id(), transaction.is_invite()));
        if let Some(mut previous) = state.transactions.insert(transaction.key().clone(), transaction) {
            previous.complete(Err(DialogError::internal("transaction key reused")));
        }
    }

    fn fail_transaction(&self, id: TransactionId, error: DialogError) {
        let transaction = self.inner.state.lock().take_transaction(id);
        if let Some(mut transaction) = transaction {
            transaction.complete(Err(error));
        }
    }

    /// Request and state of a pending transaction, for retransmission
    pub(crate) fn pending_request(&self, id: TransactionId) -> Option<(Request, TransactionState)> {
        let state = self.inner.state.lock();
        state
            .transactions
            .values()
            .find(|transaction| transaction.id() == id)
            .map(|transaction| (transaction.request().clone(), transaction.state()))
    }

    /// Fail a transaction that saw no final response in time
    pub(crate) fn expire_transaction(&self, id: TransactionId) {
        let mut state = self.inner.state.lock();
        let proceeding_invite = state
            .transactions
            .values()
            .find(|transaction| transaction.id() == id)
            .is_some_and(|transaction| transaction.is_invite() && transaction.state() == TransactionState::Proceeding);
        if proceeding_invite {
            return;
        }

        if let Some(mut transaction) = state.take_transaction(id) {
            let key = transaction.key().clone();
            warn!(call_id = %self.inner.call_id, key = %key, "Transaction timed out");
            transaction.complete(Err(DialogError::Timeout {
                method: key.method,
                cseq: key.cseq,
            }));
        }
    }

    /// Cancel a transaction on behalf of its handle
    pub(crate) async fn cancel_transaction(&self, id: TransactionId) -> DialogResult<()> {
        let cancel = {
            let mut state = self.inner.state.lock();
            let Some(mut transaction) = state.take_transaction(id) else {
                return Ok(());
            };
            transaction.complete(Err(DialogError::Cancelled));
            transaction.is_invite().then(|| self.build_cancel(transaction.request()))
        };

        if let Some(cancel) = cancel {
            debug!(call_id = %self.inner.call_id, cseq = cancel.cseq, "Cancelling INVITE");
            self.inner.connection.send_message(cancel.into()).await?;
        }
        Ok(())
    }

    fn prepare_auth_retry(
        &self,
        state: &mut DialogState,
        key: &TransactionKey,
        response: &Response,
        authenticate: &str,
        proxy: bool,
    ) -> Vec<Outgoing> {
        let Some(mut transaction) = state.transactions.remove(key) else {
            return Vec::new();
        };

        let mut outgoing = Vec::new();
        if transaction.is_invite() {
            outgoing.push((self.build_ack(transaction.request(), response), None));
        }

        let authorization = match self.authorize(transaction.request(), response, authenticate) {
            Ok(authorization) => authorization,
            Err(error) => {
                warn!(call_id = %self.inner.call_id, key = %key, "Cannot answer challenge: {}", error);
                transaction.complete(Err(error));
                return outgoing;
            }
        };

        let mut request = transaction.request().clone();
        let header = if proxy { "Proxy-Authorization" } else { "Authorization" };
        request.headers.insert(header, authorization);
        // A fresh branch for the new transaction
        request.headers.remove("Via");
        self.stamp_headers(&mut request.headers);
        state.cseq += 1;
        request.cseq = state.cseq;

        debug!(call_id = %self.inner.call_id, key = %key, cseq = request.cseq, "Re-sending request with credentials");
        let retry = transaction.reissue(request.clone());
        let id = retry.id();
        self.track_transaction(state, retry);
        outgoing.push((request, Some(id)));
        outgoing
    }

    fn authorize(&self, request: &Request, response: &Response, authenticate: &str) -> DialogResult<String> {
        let password = self.inner.password.as_deref().ok_or(DialogError::PasswordRequired)?;
        let username = match request.method {
            Method::Register => request.to.user(),
            _ => request.from.user(),
        }
        .unwrap_or_default();

        let challenge = Challenge::from_header(authenticate)?;
        let credentials = Credentials::from_authenticate_header(
            &challenge,
            request.method.as_str(),
            &response.to.uri.short(),
            username,
            password,
        )?;
        Ok(credentials.to_string())
    }

    /// ACK for a final INVITE response
    ///
    /// A 2xx ACK is a new transaction aimed at the remote target; any other
    /// ACK reuses the INVITE's branch.
    fn build_ack(&self, invite: &Request, response: &Response) -> Request {
        let uri = match (&response.contact, response.is_success()) {
            (Some(contact), true) => contact.uri.clone(),
            _ => invite.uri.clone(),
        };

        let mut ack = Request::new(Method::Ack, uri, response.from.clone(), response.to.clone(), response.cseq);
        ack.headers.insert("Call-ID", self.inner.call_id.clone());
        if !response.is_success() {
            if let Some(via) = response.headers.get("Via") {
                ack.headers.insert("Via", via);
            }
        }
        self.stamp_headers(&mut ack.headers);
        ack
    }

    fn build_cancel(&self, invite: &Request) -> Request {
        let mut cancel = Request::new(
            Method::Cancel,
            invite.uri.clone(),
            invite.from.clone(),
            invite.to.clone(),
            invite.cseq,
        );
        for via in invite.headers.get_all("Via") {
            cancel.headers.append("Via", via);
        }
        cancel.headers.insert("Call-ID", self.inner.call_id.clone());
        self.stamp_headers(&mut cancel.headers);
        cancel
    }

    async fn send_outgoing(&self, outgoing: Vec<Outgoing>) {
        for (request, transaction) in outgoing {
            let method = request.method.clone();
            if let Err(error) = self.inner.connection.send_message(request.into()).await {
                warn!(call_id = %self.inner.call_id, method = %method, "Failed to send request: {}", error);
                if let Some(id) = transaction {
                    self.fail_transaction(id, error);
                }
            }
        }
    }
}

impl fmt::Debug for Dialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialog")
            .field("call_id", &self.inner.call_id)
            .field("remote", &self.inner.connection.remote_addr())
            .finish_non_exhaustive()
    }
}
