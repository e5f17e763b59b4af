//! Tab-scoped read-through cache for dashboard and route listings.
//!
//! A hit is used verbatim with no network call. There is no TTL; entries are
//! invalidated explicitly by the flows that mutate the underlying data.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::{KeyValueStore, StoreExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a hit as is, fetch and populate on miss.
    #[default]
    ReadThrough,
    /// Drop the entry first, always fetch.
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub from_cache: bool,
}

pub struct ClientCache<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> ClientCache<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// An entry that no longer decodes is dropped and reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get_as::<T>(key) {
            Ok(value) => Ok(value),
            Err(crate::error::ClientError::Decode(e)) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                self.store.clear(key)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.store.set_as(key, value)
    }

    pub fn clear(&self, key: &str) -> Result<()> {
        self.store.clear(key)
    }

    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, mode: CacheMode, fetch: F) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match mode {
            CacheMode::Refresh => self.clear(key)?,
            CacheMode::ReadThrough => {
                if let Some(value) = self.get(key)? {
                    debug!(key, "cache hit");
                    return Ok(Cached { value, from_cache: true });
                }
            }
        }

        debug!(key, ?mode, "cache miss, fetching");
        let value = fetch().await?;
        self.set(key, &value)?;
        Ok(Cached { value, from_cache: false })
    }
}
