//! Cache-bound query observers and spawned mutations for the UI.
//!
//! Inspired by TanStack Query, a `Query<T>` binds a [`QueryKey`] to a fetcher
//! and reads through the shared [`QueryClient`]. Views poll it on every tick;
//! when a write invalidates the key, the next poll starts exactly one refetch.
//!
//! # Example
//!
//! ```ignore
//! let mut query = db.use_classes_by_owner(Some(owner));
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(classes) => render_list(classes),
//!     QueryState::Error(e) => render_alert(e),
//!     QueryState::Idle | QueryState::Disabled => {}
//! }
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::backend::{DbError, DbResult};
use crate::cache::{QueryClient, QueryKey};

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// A required parameter is missing, nothing will be fetched
  Disabled,
  /// Query has not been started
  Idle,
  /// First fetch in progress, no data yet
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with the provider's error
  Error(DbError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&DbError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A boxed future that returns a DbResult<T>
type BoxFuture<T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send>>;

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Observer of one cached read.
pub struct Query<T> {
  state: QueryState<T>,
  client: QueryClient,
  key: QueryKey,
  fetcher: Option<FetcherFn<T>>,
  receiver: Option<mpsc::UnboundedReceiver<DbResult<T>>>,
  /// Generation of `key` seen when the last fetch started
  seen_generation: u64,
}

impl<T> Query<T>
where
  T: Serialize + DeserializeOwned + Send + 'static,
{
  /// Create a query for `key`. The fetcher runs only on a cache miss.
  pub fn new<F, Fut>(client: QueryClient, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DbResult<T>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      client,
      key,
      fetcher: Some(Arc::new(move || Box::pin(fetcher()))),
      receiver: None,
      seen_generation: 0,
    }
  }

  /// Create a query that never fetches because a parameter is missing.
  pub fn disabled(client: QueryClient, key: QueryKey) -> Self {
    Self {
      state: QueryState::Disabled,
      client,
      key,
      fetcher: None,
      receiver: None,
      seen_generation: 0,
    }
  }

  /// Enabled variant when `param` is present, disabled otherwise.
  pub fn when<P, F, Fut>(client: QueryClient, key: QueryKey, param: Option<P>, fetcher: F) -> Self
  where
    P: Clone + Send + Sync + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DbResult<T>> + Send + 'static,
  {
    match param {
      Some(param) => Self::new(client, key, move || fetcher(param.clone())),
      None => Self::disabled(client, key),
    }
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Get the data if the query succeeded.
  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// Check if the query is waiting for its first result.
  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Check if any fetch is in flight, including background refetches.
  pub fn is_fetching(&self) -> bool {
    self.receiver.is_some()
  }

  pub fn error(&self) -> Option<&DbError> {
    self.state.error()
  }

  /// Start fetching data if not already fetching.
  ///
  /// This is a no-op for disabled queries.
  pub fn fetch(&mut self) {
    if self.receiver.is_some() {
      return;
    }
    self.start_fetch();
  }

  /// Force a new read through the cache, dropping any pending one.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Poll for results and for invalidation of the key.
  ///
  /// Returns `true` if the state changed or a refetch started.
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    if let Some(receiver) = &mut self.receiver {
      return match receiver.try_recv() {
        Ok(Ok(data)) => {
          self.state = QueryState::Success(data);
          self.receiver = None;
          true
        }
        Ok(Err(error)) => {
          self.state = QueryState::Error(error);
          self.receiver = None;
          true
        }
        Err(mpsc::error::TryRecvError::Empty) => false,
        Err(mpsc::error::TryRecvError::Disconnected) => {
          // Sender dropped without sending - treat as error
          self.state = QueryState::Error(DbError::Transport("Query was cancelled".to_string()));
          self.receiver = None;
          true
        }
      };
    }

    let started = !matches!(self.state, QueryState::Idle | QueryState::Disabled);
    if started && self.client.observe(&self.key) != self.seen_generation {
      self.start_fetch();
      return true;
    }
    false
  }

  /// Internal: start the fetch operation
  fn start_fetch(&mut self) {
    let fetcher = match &self.fetcher {
      Some(fetcher) => fetcher.clone(),
      None => return,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    // keep showing data while a background refetch runs
    if !self.state.is_success() {
      self.state = QueryState::Loading;
    }
    self.seen_generation = self.client.observe(&self.key);

    let client = self.client.clone();
    let key = self.key.clone();
    tokio::spawn(async move {
      let result = client.fetch(&key, move || fetcher()).await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("seen_generation", &self.seen_generation)
      .finish_non_exhaustive()
  }
}

/// A write running in the background, polled by the UI.
pub struct Mutation<T> {
  receiver: Option<oneshot::Receiver<DbResult<T>>>,
}

impl<T: Send + 'static> Mutation<T> {
  /// Spawn the write on the runtime.
  pub fn spawn<Fut>(future: Fut) -> Self
  where
    Fut: Future<Output = DbResult<T>> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(future.await);
    });
    Self { receiver: Some(rx) }
  }

  pub fn is_pending(&self) -> bool {
    self.receiver.is_some()
  }

  /// Take the result once it is available.
  pub fn poll(&mut self) -> Option<DbResult<T>> {
    let receiver = self.receiver.as_mut()?;
    match receiver.try_recv() {
      Ok(result) => {
        self.receiver = None;
        Some(result)
      }
      Err(oneshot::error::TryRecvError::Empty) => None,
      Err(oneshot::error::TryRecvError::Closed) => {
        self.receiver = None;
        Some(Err(DbError::Transport("Write was cancelled".to_string())))
      }
    }
  }
}
