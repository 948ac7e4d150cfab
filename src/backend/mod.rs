//! Remote data provider seam.
//!
//! The rest of the application talks to tables, the object bucket and the
//! auth service only through the [`Backend`] trait. Rows travel as JSON
//! values, the way the hosted REST API returns them; typed conversion happens
//! in the `db` layer.

mod error;
pub mod memory;
pub mod supabase;

pub use error::{DbError, DbResult};
pub use memory::MemoryBackend;
pub use supabase::SupabaseBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column every table is ordered by in list queries.
pub const CREATED_AT: &str = "createdAt";

/// Equality filters combined with AND, e.g. `id = ... AND owner = ...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
  conditions: Vec<(String, String)>,
}

impl Filter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
    self.conditions.push((column.to_string(), value.to_string()));
    self
  }

  pub fn conditions(&self) -> &[(String, String)] {
    &self.conditions
  }

  /// Check whether a JSON row satisfies every condition.
  pub fn matches(&self, row: &Value) -> bool {
    self.conditions.iter().all(|(column, expected)| {
      match row.get(column) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == *expected,
      }
    })
  }
}

/// Sort direction for a list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
  pub column: String,
  pub ascending: bool,
}

impl Order {
  pub fn desc(column: &str) -> Self {
    Self {
      column: column.to_string(),
      ascending: false,
    }
  }
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
  pub table: String,
  /// PostgREST column list, e.g. `*` or `*, customers ( * )`
  pub columns: String,
  pub filter: Filter,
  pub order: Option<Order>,
}

impl Select {
  pub fn from(table: &str) -> Self {
    Self {
      table: table.to_string(),
      columns: "*".to_string(),
      filter: Filter::new(),
      order: None,
    }
  }

  pub fn columns(mut self, columns: &str) -> Self {
    self.columns = columns.to_string();
    self
  }

  pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
    self.filter = self.filter.eq(column, value);
    self
  }

  pub fn order_desc(mut self, column: &str) -> Self {
    self.order = Some(Order::desc(column));
    self
  }
}

/// Identity of the signed-in user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
}

/// Hosted tables, object storage and auth behind one interface.
#[async_trait]
pub trait Backend: Send + Sync {
  /// Return all rows matching the select, in the requested order.
  async fn select(&self, query: &Select) -> DbResult<Vec<Value>>;

  /// Return exactly one row. Zero rows is `NotFound`, several rows is a provider error.
  async fn select_single(&self, query: &Select) -> DbResult<Value> {
    let mut rows = self.select(query).await?;
    match rows.len() {
      0 => Err(DbError::not_found(&query.table)),
      1 => Ok(rows.remove(0)),
      n => Err(DbError::Provider {
        code: Some("PGRST116".to_string()),
        message: format!("JSON object requested, multiple ({}) rows returned", n),
      }),
    }
  }

  /// Insert rows and return them as stored.
  async fn insert(&self, table: &str, rows: Vec<Value>) -> DbResult<Vec<Value>>;

  /// Apply a partial update to the matching rows and return them.
  async fn update(&self, table: &str, filter: &Filter, patch: Value) -> DbResult<Vec<Value>>;

  /// Delete the matching rows and return them.
  async fn delete(&self, table: &str, filter: &Filter) -> DbResult<Vec<Value>>;

  /// Store a new object. Fails if the path is already taken.
  async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> DbResult<()>;

  /// Replace the content of an existing object.
  async fn update_object(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> DbResult<()>;

  async fn download(&self, bucket: &str, path: &str) -> DbResult<Vec<u8>>;

  /// Public address of an object, suitable for handing to a browser.
  fn public_url(&self, bucket: &str, path: &str) -> String;

  /// The signed-in user, or `None` when there is no session.
  async fn current_user(&self) -> DbResult<Option<AuthUser>>;
}
