//! In-process backend with the same contract as the hosted one.
//!
//! Backs the `--demo` mode and the test suite. Rows get an `id` and a
//! strictly increasing `createdAt` when the caller does not supply them, like
//! the column defaults on the hosted tables.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{AuthUser, Backend, DbError, DbResult, Filter, Select, CREATED_AT};

/// A `column -> table.id` reference checked on insert.
#[derive(Debug, Clone)]
struct ForeignKey {
  table: String,
  column: String,
  references: String,
}

#[derive(Default)]
struct State {
  tables: HashMap<String, Vec<Value>>,
  objects: HashMap<(String, String), Vec<u8>>,
  user: Option<AuthUser>,
  foreign_keys: Vec<ForeignKey>,
  last_created: Option<DateTime<Utc>>,
  fail_next_upload: Option<DbError>,
  fail_next_update_object: Option<DbError>,
  fail_next_update: Option<DbError>,
}

/// Backend that keeps tables and objects in memory.
#[derive(Default)]
pub struct MemoryBackend {
  state: Mutex<State>,
  selects: AtomicUsize,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Start with a signed-in user.
  pub fn with_user(self, user: AuthUser) -> Self {
    if let Ok(mut state) = self.state.lock() {
      state.user = Some(user);
    }
    self
  }

  /// Reject inserts into `table` whose `column` does not name an existing `references` row.
  pub fn with_foreign_key(self, table: &str, column: &str, references: &str) -> Self {
    if let Ok(mut state) = self.state.lock() {
      state.foreign_keys.push(ForeignKey {
        table: table.to_string(),
        column: column.to_string(),
        references: references.to_string(),
      });
    }
    self
  }

  pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
    self
      .lock()
      .ok()
      .and_then(|state| state.objects.get(&(bucket.to_string(), path.to_string())).cloned())
  }

  fn lock(&self) -> DbResult<MutexGuard<'_, State>> {
    self
      .state
      .lock()
      .map_err(|e| DbError::Transport(format!("Lock poisoned: {}", e)))
  }
}

impl State {
  /// Next `createdAt` value, strictly after the previous one.
  fn next_created_at(&mut self) -> String {
    let mut now = Utc::now();
    if let Some(last) = self.last_created {
      if now <= last {
        now = last + chrono::Duration::microseconds(1);
      }
    }
    self.last_created = Some(now);
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
  }

  fn check_foreign_keys(&self, table: &str, row: &Map<String, Value>) -> DbResult<()> {
    for fk in self.foreign_keys.iter().filter(|fk| fk.table == table) {
      let value = match row.get(&fk.column) {
        Some(Value::Null) | None => continue,
        Some(v) => v,
      };
      let exists = self
        .tables
        .get(&fk.references)
        .map(|rows| rows.iter().any(|r| r.get("id") == Some(value)))
        .unwrap_or(false);
      if !exists {
        return Err(DbError::Provider {
          code: Some("23503".to_string()),
          message: format!(
            "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\"",
            table, table, fk.column
          ),
        });
      }
    }
    Ok(())
  }

  /// Attach rows referenced by `name ( * )` segments of a column list.
  fn embed(&self, columns: &str, mut row: Value) -> Value {
    let embedded = columns
      .split(',')
      .filter_map(|part| part.split_once('(').map(|(name, _)| name.trim().to_string()))
      .filter(|name| !name.is_empty());

    let id = row.get("id").cloned();
    for name in embedded {
      let related = self
        .tables
        .get(&name)
        .and_then(|rows| rows.iter().find(|r| r.get("id") == id.as_ref()))
        .cloned()
        .unwrap_or(Value::Null);
      if let Some(obj) = row.as_object_mut() {
        obj.insert(name, related);
      }
    }
    row
  }
}

/// Order two JSON values of the same kind; mixed kinds compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
    (Some(Value::Number(a)), Some(Value::Number(b))) => {
      let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
      a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
    (Some(_), None) => Ordering::Greater,
    (None, Some(_)) => Ordering::Less,
    _ => Ordering::Equal,
  }
}

/// Hooks for steering the backend from tests.
#[cfg(test)]
impl MemoryBackend {
  pub fn sign_out(&self) {
    if let Ok(mut state) = self.state.lock() {
      state.user = None;
    }
  }

  /// Make the next upload fail with the given error.
  pub fn fail_next_upload(&self, error: DbError) {
    if let Ok(mut state) = self.state.lock() {
      state.fail_next_upload = Some(error);
    }
  }

  /// Make the next object overwrite fail with the given error.
  pub fn fail_next_update_object(&self, error: DbError) {
    if let Ok(mut state) = self.state.lock() {
      state.fail_next_update_object = Some(error);
    }
  }

  /// Make the next row update fail with the given error.
  pub fn fail_next_update(&self, error: DbError) {
    if let Ok(mut state) = self.state.lock() {
      state.fail_next_update = Some(error);
    }
  }

  /// Number of `select` calls served so far.
  pub fn select_count(&self) -> usize {
    self.selects.load(AtomicOrdering::SeqCst)
  }

  /// Snapshot of every row in a table, in insertion order.
  pub fn rows(&self, table: &str) -> Vec<Value> {
    self
      .lock()
      .map(|state| state.tables.get(table).cloned().unwrap_or_default())
      .unwrap_or_default()
  }

  /// Paths of every object stored in `bucket`.
  pub fn object_paths(&self, bucket: &str) -> Vec<String> {
    let mut paths: Vec<String> = self
      .lock()
      .map(|state| {
        state
          .objects
          .keys()
          .filter(|(b, _)| b == bucket)
          .map(|(_, path)| path.clone())
          .collect()
      })
      .unwrap_or_default();
    paths.sort();
    paths
  }
}

#[async_trait]
impl Backend for MemoryBackend {
  async fn select(&self, query: &Select) -> DbResult<Vec<Value>> {
    self.selects.fetch_add(1, AtomicOrdering::SeqCst);
    let state = self.lock()?;

    let mut rows: Vec<Value> = state
      .tables
      .get(&query.table)
      .map(|rows| {
        rows
          .iter()
          .filter(|row| query.filter.matches(row))
          .cloned()
          .collect()
      })
      .unwrap_or_default();

    if let Some(order) = &query.order {
      rows.sort_by(|a, b| {
        let ord = compare_values(a.get(&order.column), b.get(&order.column));
        if order.ascending {
          ord
        } else {
          ord.reverse()
        }
      });
    }

    Ok(
      rows
        .into_iter()
        .map(|row| state.embed(&query.columns, row))
        .collect(),
    )
  }

  async fn insert(&self, table: &str, rows: Vec<Value>) -> DbResult<Vec<Value>> {
    let mut state = self.lock()?;

    let mut stored = Vec::with_capacity(rows.len());
    for row in rows {
      let mut obj = match row {
        Value::Object(obj) => obj,
        _ => return Err(DbError::provider("Row must be a JSON object")),
      };
      if !obj.contains_key("id") {
        obj.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
      }
      if !obj.contains_key(CREATED_AT) {
        obj.insert(CREATED_AT.to_string(), Value::String(state.next_created_at()));
      }
      state.check_foreign_keys(table, &obj)?;

      let existing = state.tables.get(table);
      if existing.is_some_and(|rows| rows.iter().any(|r| r.get("id") == obj.get("id"))) {
        return Err(DbError::Provider {
          code: Some("23505".to_string()),
          message: format!("duplicate key value violates unique constraint \"{}_pkey\"", table),
        });
      }
      stored.push(Value::Object(obj));
    }

    state
      .tables
      .entry(table.to_string())
      .or_default()
      .extend(stored.iter().cloned());
    Ok(stored)
  }

  async fn update(&self, table: &str, filter: &Filter, patch: Value) -> DbResult<Vec<Value>> {
    let patch = match patch {
      Value::Object(obj) => obj,
      _ => return Err(DbError::provider("Patch must be a JSON object")),
    };
    let mut state = self.lock()?;
    if let Some(error) = state.fail_next_update.take() {
      return Err(error);
    }

    let mut updated = Vec::new();
    if let Some(rows) = state.tables.get_mut(table) {
      for row in rows.iter_mut().filter(|row| filter.matches(row)) {
        if let Some(obj) = row.as_object_mut() {
          for (column, value) in &patch {
            // the primary key is immutable
            if column != "id" {
              obj.insert(column.clone(), value.clone());
            }
          }
        }
        updated.push(row.clone());
      }
    }
    Ok(updated)
  }

  async fn delete(&self, table: &str, filter: &Filter) -> DbResult<Vec<Value>> {
    let mut state = self.lock()?;
    let rows = match state.tables.get_mut(table) {
      Some(rows) => rows,
      None => return Ok(Vec::new()),
    };
    let (deleted, kept): (Vec<Value>, Vec<Value>) =
      rows.drain(..).partition(|row| filter.matches(row));
    *rows = kept;
    Ok(deleted)
  }

  async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> DbResult<()> {
    let mut state = self.lock()?;
    if let Some(error) = state.fail_next_upload.take() {
      return Err(error);
    }
    let key = (bucket.to_string(), path.to_string());
    if state.objects.contains_key(&key) {
      return Err(DbError::Storage {
        status: Some(409),
        message: "The resource already exists".to_string(),
      });
    }
    state.objects.insert(key, bytes);
    Ok(())
  }

  async fn update_object(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> DbResult<()> {
    let mut state = self.lock()?;
    if let Some(error) = state.fail_next_update_object.take() {
      return Err(error);
    }
    match state.objects.get_mut(&(bucket.to_string(), path.to_string())) {
      Some(existing) => {
        *existing = bytes;
        Ok(())
      }
      None => Err(DbError::Storage {
        status: Some(404),
        message: "Object not found".to_string(),
      }),
    }
  }

  async fn download(&self, bucket: &str, path: &str) -> DbResult<Vec<u8>> {
    self
      .object(bucket, path)
      .ok_or_else(|| DbError::Storage {
        status: Some(404),
        message: "Object not found".to_string(),
      })
  }

  fn public_url(&self, bucket: &str, path: &str) -> String {
    format!("memory://{}/{}", bucket, path)
  }

  async fn current_user(&self) -> DbResult<Option<AuthUser>> {
    Ok(self.lock()?.user.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn user() -> AuthUser {
    AuthUser {
      id: "u1".to_string(),
      email: Some("ada@example.com".to_string()),
    }
  }

  #[tokio::test]
  async fn test_insert_fills_defaults() {
    let backend = MemoryBackend::new();
    let rows = backend
      .insert("items", vec![json!({"name": "first"})])
      .await
      .unwrap();

    assert_eq!(rows.len(), 1);
    assert!(rows[0].get("id").and_then(Value::as_str).is_some());
    assert!(rows[0].get(CREATED_AT).and_then(Value::as_str).is_some());
  }

  #[tokio::test]
  async fn test_created_at_strictly_increases() {
    let backend = MemoryBackend::new();
    let a = backend.insert("items", vec![json!({})]).await.unwrap();
    let b = backend.insert("items", vec![json!({})]).await.unwrap();
    assert!(b[0][CREATED_AT].as_str() > a[0][CREATED_AT].as_str());
  }

  #[tokio::test]
  async fn test_select_orders_descending() {
    let backend = MemoryBackend::new();
    for n in [1, 3, 2] {
      backend
        .insert("classes", vec![json!({"owner": "u1", CREATED_AT: n})])
        .await
        .unwrap();
    }

    let rows = backend
      .select(&Select::from("classes").eq("owner", "u1").order_desc(CREATED_AT))
      .await
      .unwrap();
    let order: Vec<i64> = rows.iter().filter_map(|r| r[CREATED_AT].as_i64()).collect();
    assert_eq!(order, vec![3, 2, 1]);
  }

  #[tokio::test]
  async fn test_select_single_contract() {
    let backend = MemoryBackend::new();
    backend
      .insert("items", vec![json!({"id": "a", "owner": "u1"}), json!({"id": "b", "owner": "u1"})])
      .await
      .unwrap();

    let one = backend
      .select_single(&Select::from("items").eq("id", "a"))
      .await
      .unwrap();
    assert_eq!(one["id"], "a");

    let none = backend
      .select_single(&Select::from("items").eq("id", "zzz"))
      .await
      .unwrap_err();
    assert!(none.is_not_found());

    let many = backend
      .select_single(&Select::from("items").eq("owner", "u1"))
      .await
      .unwrap_err();
    assert!(matches!(many, DbError::Provider { .. }));
  }

  #[tokio::test]
  async fn test_update_never_changes_id() {
    let backend = MemoryBackend::new();
    backend
      .insert("items", vec![json!({"id": "a", "name": "old", "featured": true})])
      .await
      .unwrap();

    let rows = backend
      .update("items", &Filter::new().eq("id", "a"), json!({"id": "b", "name": "new"}))
      .await
      .unwrap();

    assert_eq!(rows[0]["id"], "a");
    assert_eq!(rows[0]["name"], "new");
    assert_eq!(rows[0]["featured"], true);
  }

  #[tokio::test]
  async fn test_foreign_key_violation() {
    let backend = MemoryBackend::new().with_foreign_key("documents", "class_id", "classes");
    let err = backend
      .insert("documents", vec![json!({"class_id": "nope"})])
      .await
      .unwrap_err();
    assert!(matches!(err, DbError::Provider { code: Some(ref c), .. } if c == "23503"));
  }

  #[tokio::test]
  async fn test_embeds_related_rows() {
    let backend = MemoryBackend::new();
    backend.insert("users", vec![json!({"id": "u1"})]).await.unwrap();
    backend
      .insert("customers", vec![json!({"id": "u1", "stripe_customer_id": "cus_1"})])
      .await
      .unwrap();

    let row = backend
      .select_single(&Select::from("users").columns("*, customers ( * )").eq("id", "u1"))
      .await
      .unwrap();
    assert_eq!(row["customers"]["stripe_customer_id"], "cus_1");
  }

  #[tokio::test]
  async fn test_upload_rejects_existing_path() {
    let backend = MemoryBackend::new();
    backend.upload("documents", "c1/1.pdf", vec![1]).await.unwrap();
    let err = backend
      .upload("documents", "c1/1.pdf", vec![2])
      .await
      .unwrap_err();
    assert!(matches!(err, DbError::Storage { status: Some(409), .. }));

    backend
      .update_object("documents", "c1/1.pdf", vec![3])
      .await
      .unwrap();
    assert_eq!(backend.object("documents", "c1/1.pdf"), Some(vec![3]));
  }

  #[tokio::test]
  async fn test_current_user() {
    let backend = MemoryBackend::new().with_user(user());
    assert_eq!(backend.current_user().await.unwrap(), Some(user()));
    backend.sign_out();
    assert_eq!(backend.current_user().await.unwrap(), None);
  }
}
