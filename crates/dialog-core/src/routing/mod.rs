//! Dialplan routing
//!
//! A [`Router`] maps the user part of a request-URI to the [`Callback`] that
//! handles out-of-dialog requests for it. Routers are cheap handles: clones
//! share the same table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::dialog::Callback;

#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Arc<RwLock<HashMap<String, Callback>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests for `user` to `route`, replacing any previous route
    pub fn add_user(&self, user: impl Into<String>, route: Callback) {
        let user = user.into();
        debug!(user = %user, "Adding dialplan route");
        self.routes.write().insert(user, route);
    }

    pub fn remove_user(&self, user: &str) -> Option<Callback> {
        self.routes.write().remove(user)
    }

    pub fn resolve(&self, user: &str) -> Option<Callback> {
        self.routes.read().get(user).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Whether both handles share one table
    pub fn same_as(&self, other: &Router) -> bool {
        Arc::ptr_eq(&self.routes, &other.routes)
    }
}
