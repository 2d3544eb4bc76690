//! In-dialog request handlers
//!
//! A [`Callback`] wraps either a synchronous or an asynchronous handler and
//! says which one it is through [`CallbackMode`]. Per-registration arguments
//! are captured by the closure itself.
//!
//! ```rust
//! use sipline_dialog_core::dialog::{Callback, CallbackMode};
//!
//! let log = Callback::from_fn(|dialog, request| {
//!     println!("{} in {}", request.method, dialog.call_id());
//!     Ok(())
//! });
//! let notify = Callback::from_async(|_dialog, _request| async move { Ok(()) });
//!
//! assert_eq!(log.mode(), CallbackMode::Sync);
//! assert_eq!(notify.mode(), CallbackMode::Async);
//! assert!(log.same_as(&log.clone()));
//! assert!(!log.same_as(&notify));
//! ```

use std::fmt;
use std::future::Future;
use std::ptr;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use sipline_sip_core::Request;
use tracing::warn;

use crate::dialog::Dialog;
use crate::errors::DialogResult;

/// Handler that runs to completion on the dispatch task
pub type SyncHandler = dyn Fn(Dialog, Request) -> DialogResult<()> + Send + Sync;

/// Handler whose future is spawned as a tracked background task
pub type AsyncHandler = dyn Fn(Dialog, Request) -> BoxFuture<'static, DialogResult<()>> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMode {
    Sync,
    Async,
}

#[derive(Clone)]
enum Handler {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

/// A registered request handler
///
/// Clones share identity: unregistering any clone removes every registration
/// made with the same callback.
#[derive(Clone)]
pub struct Callback {
    handler: Handler,
}

impl Callback {
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(Dialog, Request) -> DialogResult<()> + Send + Sync + 'static,
    {
        Self {
            handler: Handler::Sync(Arc::new(handler)),
        }
    }

    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(Dialog, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DialogResult<()>> + Send + 'static,
    {
        Self {
            handler: Handler::Async(Arc::new(move |dialog: Dialog, request: Request| {
                handler(dialog, request).boxed()
            })),
        }
    }

    pub fn mode(&self) -> CallbackMode {
        match self.handler {
            Handler::Sync(_) => CallbackMode::Sync,
            Handler::Async(_) => CallbackMode::Async,
        }
    }

    /// Whether both values were cloned from the same callback
    pub fn same_as(&self, other: &Callback) -> bool {
        match (&self.handler, &other.handler) {
            (Handler::Sync(a), Handler::Sync(b)) => ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Handler::Async(a), Handler::Async(b)) => ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }

    /// Run a sync handler inline or hand back the future of an async one
    pub(crate) fn invoke(&self, dialog: &Dialog, request: &Request) -> Option<BoxFuture<'static, DialogResult<()>>> {
        match &self.handler {
            Handler::Sync(handler) => {
                if let Err(e) = handler(dialog.clone(), request.clone()) {
                    warn!(call_id = %dialog.call_id(), method = %request.method, "Request handler failed: {}", e);
                }
                None
            }
            Handler::Async(handler) => Some(handler(dialog.clone(), request.clone())),
        }
    }

    fn address(&self) -> *const () {
        match &self.handler {
            Handler::Sync(handler) => Arc::as_ptr(handler) as *const (),
            Handler::Async(handler) => Arc::as_ptr(handler) as *const (),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:?} @ {:p})", self.mode(), self.address())
    }
}
