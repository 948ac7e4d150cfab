//! Query client that orchestrates snapshot lookups, remote fetches and invalidation.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::key::{QueryFilter, QueryKey};
use crate::backend::{DbError, DbResult};

type SharedFetch = Shared<BoxFuture<'static, DbResult<Value>>>;

/// Bookkeeping for one known key.
struct Entry {
  key: QueryKey,
  /// Bumped on every invalidation; observers refetch when it moves.
  generation: u64,
  /// Result of the latest generation, if one has been fetched.
  snapshot: Option<Value>,
}

/// A remote fetch that other readers of the same key can join.
struct InFlight {
  id: u64,
  generation: u64,
  fetch: SharedFetch,
}

#[derive(Default)]
struct Registry {
  entries: HashMap<String, Entry>,
  in_flight: HashMap<String, InFlight>,
  next_flight: u64,
}

/// Process-wide query cache.
///
/// Cloning is cheap and every clone shares the same registry.
/// There is no expiry: a snapshot is served until a write invalidates its key.
#[derive(Clone, Default)]
pub struct QueryClient {
  registry: Arc<Mutex<Registry>>,
}

impl QueryClient {
  fn lock(&self) -> DbResult<MutexGuard<'_, Registry>> {
    self
      .registry
      .lock()
      .map_err(|e| DbError::Cache(format!("Lock poisoned: {}", e)))
  }

  /// Register interest in a key and return its current generation.
  pub fn observe(&self, key: &QueryKey) -> u64 {
    let mut registry = match self.lock() {
      Ok(registry) => registry,
      Err(_) => return 0,
    };
    registry
      .entries
      .entry(key.cache_hash())
      .or_insert_with(|| Entry::new(key.clone()))
      .generation
  }

  /// Return the cached value for `key`, or run `fetcher` and cache its result.
  ///
  /// Concurrent calls for the same key and generation share one remote fetch.
  /// A read that starts after an invalidation never joins a fetch that began
  /// before it. A result that arrives after the key was invalidated is
  /// returned to its callers but not stored. Failures are never cached.
  pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> DbResult<T>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = DbResult<T>> + Send + 'static,
  {
    let hash = key.cache_hash();

    let (flight_id, fetch) = {
      let mut guard = self.lock()?;
      let registry = &mut *guard;
      let entry = registry
        .entries
        .entry(hash.clone())
        .or_insert_with(|| Entry::new(key.clone()));

      if let Some(snapshot) = &entry.snapshot {
        debug!(%key, "cache hit");
        return decode(snapshot.clone());
      }

      match registry.in_flight.get(&hash) {
        Some(flight) if flight.generation == entry.generation => {
          debug!(%key, "joining in-flight fetch");
          (flight.id, flight.fetch.clone())
        }
        _ => {
          debug!(%key, "cache miss");
          let pending = fetcher();
          let fetch = async move {
            let data = pending.await?;
            Ok::<_, DbError>(serde_json::to_value(data)?)
          }
          .boxed()
          .shared();

          registry.next_flight += 1;
          let id = registry.next_flight;
          // replaces any flight started before the last invalidation
          registry.in_flight.insert(
            hash.clone(),
            InFlight {
              id,
              generation: entry.generation,
              fetch: fetch.clone(),
            },
          );
          (id, fetch)
        }
      }
    };

    let result = fetch.await;
    self.settle(key, &hash, flight_id, &result)?;
    decode(result?)
  }

  /// Retire a finished flight and store its result if the key is still current.
  fn settle(
    &self,
    key: &QueryKey,
    hash: &str,
    flight_id: u64,
    result: &DbResult<Value>,
  ) -> DbResult<()> {
    let mut guard = self.lock()?;
    let registry = &mut *guard;

    // another caller may already have settled this flight, or a newer one replaced it
    let current = registry
      .in_flight
      .get(hash)
      .is_some_and(|flight| flight.id == flight_id);
    let flight = if current {
      registry.in_flight.remove(hash)
    } else {
      None
    };
    let (flight, data) = match (flight, result) {
      (Some(flight), Ok(data)) => (flight, data),
      _ => return Ok(()),
    };

    if let Some(entry) = registry.entries.get_mut(hash) {
      if entry.generation == flight.generation {
        entry.snapshot = Some(data.clone());
      } else {
        debug!(%key, "discarding result fetched before invalidation");
      }
    }
    Ok(())
  }

  /// Mark every key matching `filter` stale. Returns how many keys matched.
  ///
  /// Invalidating twice has the same effect as once: the next read refetches.
  pub fn invalidate(&self, filter: impl Into<QueryFilter>) -> DbResult<usize> {
    let filter = filter.into();
    let mut registry = self.lock()?;

    let mut count = 0;
    for entry in registry.entries.values_mut() {
      if filter.matches(&entry.key) {
        entry.stale();
        count += 1;
      }
    }
    debug!(%filter, count, "invalidated");
    Ok(count)
  }

  /// Drop every snapshot and mark all keys stale.
  pub fn clear(&self) -> DbResult<()> {
    let mut registry = self.lock()?;
    registry.entries.values_mut().for_each(Entry::stale);
    debug!(count = registry.entries.len(), "cleared");
    Ok(())
  }
}

impl Entry {
  fn new(key: QueryKey) -> Self {
    Self {
      key,
      generation: 0,
      snapshot: None,
    }
  }

  fn stale(&mut self) {
    self.generation += 1;
    self.snapshot = None;
  }
}

fn decode<T: DeserializeOwned>(data: Value) -> DbResult<T> {
  Ok(serde_json::from_value(data)?)
}
