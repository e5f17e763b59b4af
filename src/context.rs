//! Application root: everything a page needs, built once and passed down.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::Api;
use crate::auth::{Clock, SessionGuard, SystemClock};
use crate::cache::ClientCache;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::rest::AuthenticatedFetcher;
use crate::storage::{keys, FileStore, KeyValueStore};

pub const PERSISTED_FILE: &str = "persisted.json";
pub const SESSION_FILE: &str = "session.json";

pub struct AppContext {
    pub config: ClientConfig,
    /// Token, selections and the generated test hand-off.
    pub persisted: Arc<dyn KeyValueStore>,
    /// Tab-scoped cache entries.
    pub session: Arc<dyn KeyValueStore>,
    pub fetcher: AuthenticatedFetcher,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(
        config: ClientConfig,
        persisted: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fetcher = AuthenticatedFetcher::new(&config);
        Self {
            config,
            persisted,
            session,
            fetcher,
            clock,
        }
    }

    /// File-backed stores under the configured state directory.
    pub fn from_config(config: ClientConfig) -> Self {
        let persisted = Arc::new(FileStore::open(config.state_dir.join(PERSISTED_FILE)));
        let session = Arc::new(FileStore::open(config.state_dir.join(SESSION_FILE)));
        Self::new(config, persisted, session, Arc::new(SystemClock))
    }

    pub fn guard(&self) -> SessionGuard<'_> {
        SessionGuard::new(self.persisted.as_ref(), self.clock.as_ref())
    }

    pub fn cache(&self) -> ClientCache<'_> {
        ClientCache::new(self.session.as_ref())
    }

    pub fn anonymous_api(&self) -> Api {
        Api::anonymous(self.fetcher.clone())
    }

    /// Run the session guard for a page mount and bind the token to `cancel`.
    pub fn mount(&self, cancel: CancellationToken) -> Result<Api> {
        let session = self.guard().require()?;
        Ok(Api::new(self.fetcher.clone(), Some(session.token), cancel))
    }

    /// Drop aggregate data that a mutation may have made stale.
    pub fn invalidate_dashboard(&self) -> Result<()> {
        self.cache().clear(keys::DASHBOARD)
    }

    pub fn invalidate_routes(&self, project_id: i64) -> Result<()> {
        self.cache().clear(&keys::routes(project_id))
    }
}
