//! Process-wide state shared by every command.

use std::future::Future;
use std::sync::Arc;

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::AppResult;
use crate::sale::SaleSession;
use crate::scope::ScopeRegistry;
use crate::storage::TokenStore;
use crate::submission::ComposeSession;

pub struct AppState {
    pub api: ApiClient,
    /// Job card create/edit screen.
    pub compose: ComposeSession,
    /// Point-of-sale screen.
    pub sale: SaleSession,
    pub scopes: ScopeRegistry,
}

impl AppState {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> AppResult<Self> {
        Ok(Self {
            api: ApiClient::new(config, tokens)?,
            compose: ComposeSession::new(),
            sale: SaleSession::new(),
            scopes: ScopeRegistry::default(),
        })
    }

    /// Run a call under the scope of `view_id`, or unscoped without one.
    pub async fn scoped<F, T>(&self, view_id: Option<&str>, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match view_id.map(str::trim).filter(|v| !v.is_empty()) {
            Some(id) => self.scopes.open(id).run(fut).await,
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::storage::MemoryTokenStore;

    fn state() -> AppState {
        AppState::new(
            ClientConfig::with_base_url("http://127.0.0.1:9"),
            Arc::new(MemoryTokenStore::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_scoped_call_cancelled_after_view_closes() {
        let state = state();
        state.scopes.open("jobs#1");
        state.scopes.close("jobs#1");
        // A closed view id gets a fresh scope on reopen.
        let ok = state.scoped(Some("jobs#1"), async { Ok(1) }).await.unwrap();
        assert_eq!(ok, 1);

        let (result, ()) = tokio::join!(
            state.scoped(Some("jobs#2"), async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok::<_, AppError>(2)
            }),
            async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                state.scopes.close("jobs#2");
            }
        );
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unscoped_call_runs() {
        let state = state();
        assert_eq!(state.scoped(None, async { Ok(3) }).await.unwrap(), 3);
        assert_eq!(state.scoped(Some("  "), async { Ok(4) }).await.unwrap(), 4);
    }
}
