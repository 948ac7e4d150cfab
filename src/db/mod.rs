//! Entity access: cached reads and invalidating writes per table.
//!
//! Every write completes against the backend before the affected keys are
//! invalidated, so a refetch triggered by the invalidation sees the new state.

mod class;
mod document;
mod item;
pub mod types;
mod user;

pub use types::{
  Class, ClassPatch, Document, DocumentForm, Item, ItemPatch, NewClass, NewItem, User,
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::backend::{AuthUser, Backend, DbError, DbResult, Select};
use crate::cache::{QueryClient, QueryKey};
use crate::query::Query;

/// Default object storage bucket for document files.
pub const DOCUMENTS_BUCKET: &str = "documents";

/// Shared data-access context, created once at startup and handed to every view.
#[derive(Clone)]
pub struct Db {
  backend: Arc<dyn Backend>,
  queries: QueryClient,
  bucket: String,
}

impl Db {
  pub fn new(backend: Arc<dyn Backend>, queries: QueryClient) -> Self {
    Self {
      backend,
      queries,
      bucket: DOCUMENTS_BUCKET.to_string(),
    }
  }

  pub fn with_bucket(mut self, bucket: &str) -> Self {
    self.bucket = bucket.to_string();
    self
  }

  pub fn queries(&self) -> &QueryClient {
    &self.queries
  }

  /// The signed-in user, failing when there is no session.
  pub async fn current_user(&self) -> DbResult<AuthUser> {
    self
      .backend
      .current_user()
      .await?
      .ok_or(DbError::NotAuthenticated)
  }

  /// Build a started query for `key` that is disabled when `param` is empty.
  fn use_query<T, F, Fut>(&self, key: QueryKey, param: Option<&str>, fetcher: F) -> Query<T>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(Arc<dyn Backend>, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DbResult<T>> + Send + 'static,
  {
    let backend = self.backend.clone();
    let param = param.filter(|p| !p.is_empty()).map(String::from);
    let mut query = Query::when(self.queries.clone(), key, param, move |param: String| {
      fetcher(backend.clone(), param)
    });
    query.fetch();
    query
  }
}

/// Fetch exactly one row and decode it.
async fn fetch_single<T: DeserializeOwned>(backend: Arc<dyn Backend>, select: Select) -> DbResult<T> {
  decode_row(backend.select_single(&select).await?)
}

/// Fetch a list of rows and decode them in order.
async fn fetch_list<T: DeserializeOwned>(backend: Arc<dyn Backend>, select: Select) -> DbResult<Vec<T>> {
  backend
    .select(&select)
    .await?
    .into_iter()
    .map(decode_row)
    .collect()
}

fn decode_row<T: DeserializeOwned>(row: Value) -> DbResult<T> {
  Ok(serde_json::from_value(row)?)
}

fn to_row<T: Serialize>(data: &T) -> DbResult<Value> {
  Ok(serde_json::to_value(data)?)
}

/// First row of a write result; an empty result means nothing matched.
fn first_row<T: DeserializeOwned>(rows: Vec<Value>, table: &str) -> DbResult<T> {
  match rows.into_iter().next() {
    Some(row) => decode_row(row),
    None => Err(DbError::not_found(table)),
  }
}
