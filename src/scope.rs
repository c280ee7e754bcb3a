//! Network calls bound to a screen's lifetime.
//!
//! Each open screen gets a [`ViewScope`]. Closing the screen cancels every
//! call still running under it, so a late response never lands in state that
//! belongs to a screen the user already left.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    token: CancellationToken,
}

impl ViewScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope cancelled together with this one (but not the reverse).
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    /// Run `fut` unless the scope is closed first.
    pub async fn run<F, T>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        if self.token.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(AppError::Cancelled),
            result = fut => result,
        }
    }
}

/// Screens that never report unmounting would otherwise pile up here.
pub const MAX_OPEN_VIEWS: usize = 64;

#[derive(Debug)]
struct Entry {
    scope: ViewScope,
    last_used: u64,
}

/// Scopes for the screens currently mounted in the webview, keyed by the
/// screen's instance id.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    inner: Mutex<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    scopes: HashMap<String, Entry>,
    clock: u64,
}

impl ScopeRegistry {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Scope for `view_id`, created on first use. Scopes closed directly are
    /// dropped, and past [`MAX_OPEN_VIEWS`] the least recently used view is
    /// closed.
    pub fn open(&self, view_id: &str) -> ViewScope {
        let mut reg = self.registry();
        reg.clock += 1;
        let now = reg.clock;
        reg.scopes.retain(|_, e| !e.scope.is_closed());

        let entry = reg.scopes.entry(view_id.to_string()).or_insert_with(|| Entry {
            scope: ViewScope::new(),
            last_used: now,
        });
        entry.last_used = now;
        let scope = entry.scope.clone();

        while reg.scopes.len() > MAX_OPEN_VIEWS {
            let oldest = reg
                .scopes
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone());
            let Some(id) = oldest else { break };
            if let Some(evicted) = reg.scopes.remove(&id) {
                evicted.scope.close();
                debug!(view_id = %id, "evicted stale view scope");
            }
        }
        scope
    }

    pub fn len(&self) -> usize {
        self.registry().scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel outstanding calls for `view_id` and forget it.
    pub fn close(&self, view_id: &str) -> bool {
        let removed = self.registry().scopes.remove(view_id);
        match removed {
            Some(Entry { scope, .. }) => {
                scope.close();
                debug!(view_id, "view scope closed");
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let drained: Vec<ViewScope> = self
            .registry()
            .scopes
            .drain()
            .map(|(_, e)| e.scope)
            .collect();
        for scope in drained {
            scope.close();
        }
    }
}
