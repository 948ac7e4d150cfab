use tracing::info;

use super::types::{Class, ClassPatch, NewClass};
use super::{fetch_list, fetch_single, first_row, to_row, Db};
use crate::backend::{DbResult, Filter, Select, CREATED_AT};
use crate::cache::{QueryFilter, QueryKey};
use crate::query::Query;

const TABLE: &str = "classes";

impl Db {
  /// Fetch one class. Disabled until `id` is known.
  pub fn use_class(&self, id: Option<&str>) -> Query<Class> {
    let key = QueryKey::new("class").param("id", id.unwrap_or_default());
    self.use_query(key, id, |backend, id| {
      fetch_single(backend, Select::from(TABLE).eq("id", id))
    })
  }

  /// Fetch all classes of an owner, newest first. Disabled until `owner` is known.
  pub fn use_classes_by_owner(&self, owner: Option<&str>) -> Query<Vec<Class>> {
    let key = QueryKey::new("classes").param("owner", owner.unwrap_or_default());
    self.use_query(key, owner, |backend, owner| {
      fetch_list(
        backend,
        Select::from(TABLE).eq("owner", owner).order_desc(CREATED_AT),
      )
    })
  }

  pub async fn create_class(&self, data: NewClass) -> DbResult<Class> {
    info!(owner = %data.owner, name = %data.name, "Creating class");
    let rows = self.backend.insert(TABLE, vec![to_row(&data)?]).await?;
    let class = first_row(rows, TABLE)?;
    self.queries.invalidate(QueryFilter::all("classes"))?;
    Ok(class)
  }

  pub async fn update_class(&self, id: &str, data: ClassPatch) -> DbResult<Class> {
    info!(%id, "Updating class");
    let rows = self
      .backend
      .update(TABLE, &Filter::new().eq("id", id), to_row(&data)?)
      .await?;
    let class = first_row(rows, TABLE)?;
    self.invalidate_class(id)?;
    Ok(class)
  }

  pub async fn delete_class(&self, id: &str) -> DbResult<Class> {
    info!(%id, "Deleting class");
    let rows = self
      .backend
      .delete(TABLE, &Filter::new().eq("id", id))
      .await?;
    let class = first_row(rows, TABLE)?;
    self.invalidate_class(id)?;
    Ok(class)
  }

  fn invalidate_class(&self, id: &str) -> DbResult<()> {
    self.queries.invalidate(QueryKey::new("class").param("id", id))?;
    self.queries.invalidate(QueryFilter::all("classes"))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{Backend, DbError};
  use crate::db::test_support::{settle, setup, USER_ID};
  use crate::query::QueryState;
  use serde_json::json;

  fn new_class(name: &str) -> NewClass {
    NewClass {
      owner: USER_ID.to_string(),
      name: name.to_string(),
      description: Some("Weekly lectures".to_string()),
    }
  }

  #[tokio::test]
  async fn test_create_then_read() {
    let (_backend, db) = setup();
    let created = db.create_class(new_class("Algebra")).await.unwrap();

    let mut query = db.use_class(Some(&created.id));
    let state = settle(&mut query).await;
    assert_eq!(state, &QueryState::Success(created.clone()));
    assert_eq!(created.name, "Algebra");
    assert_eq!(created.owner, USER_ID);
  }

  #[tokio::test]
  async fn test_missing_id_disables_query() {
    let (backend, db) = setup();
    let mut query = db.use_class(None);
    assert_eq!(settle(&mut query).await, &QueryState::Disabled);

    let mut empty = db.use_classes_by_owner(Some(""));
    assert_eq!(settle(&mut empty).await, &QueryState::Disabled);
    assert_eq!(backend.select_count(), 0);
  }

  #[tokio::test]
  async fn test_list_is_newest_first() {
    let (backend, db) = setup();
    for (name, at) in [
      ("one", "2024-01-01T00:00:01Z"),
      ("three", "2024-01-01T00:00:03Z"),
      ("two", "2024-01-01T00:00:02Z"),
    ] {
      backend
        .insert(TABLE, vec![json!({"owner": USER_ID, "name": name, "createdAt": at})])
        .await
        .unwrap();
    }

    let mut query = db.use_classes_by_owner(Some(USER_ID));
    let names: Vec<String> = settle(&mut query)
      .await
      .data()
      .unwrap()
      .iter()
      .map(|c| c.name.clone())
      .collect();
    assert_eq!(names, vec!["three", "two", "one"]);
  }

  #[tokio::test]
  async fn test_create_refreshes_mounted_list() {
    let (backend, db) = setup();
    let mut list = db.use_classes_by_owner(Some(USER_ID));
    assert_eq!(settle(&mut list).await.data().map(Vec::len), Some(0));

    db.create_class(new_class("Biology")).await.unwrap();
    let classes = settle(&mut list).await.data().unwrap().clone();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name, "Biology");
    // one initial fetch plus exactly one refetch
    assert_eq!(backend.select_count(), 2);
  }

  #[tokio::test]
  async fn test_update_overwrites_given_fields_only() {
    let (_backend, db) = setup();
    let created = db.create_class(new_class("Algebra")).await.unwrap();
    let mut query = db.use_class(Some(&created.id));
    settle(&mut query).await;

    let updated = db
      .update_class(
        &created.id,
        ClassPatch {
          name: Some("Linear Algebra".to_string()),
          description: None,
        },
      )
      .await
      .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, "Linear Algebra");
    assert_eq!(updated.description, created.description);
    assert_eq!(settle(&mut query).await.data(), Some(&updated));
  }

  #[tokio::test]
  async fn test_update_missing_row_is_not_found() {
    let (_backend, db) = setup();
    let err = db
      .update_class("nope", ClassPatch::default())
      .await
      .unwrap_err();
    assert!(err.is_not_found());
  }

  #[tokio::test]
  async fn test_delete_then_read_is_not_found() {
    let (_backend, db) = setup();
    let created = db.create_class(new_class("Chemistry")).await.unwrap();
    let mut query = db.use_class(Some(&created.id));
    assert!(settle(&mut query).await.is_success());

    db.delete_class(&created.id).await.unwrap();
    let state = settle(&mut query).await;
    assert!(matches!(state, QueryState::Error(DbError::NotFound { .. })));

    assert!(db.delete_class(&created.id).await.unwrap_err().is_not_found());
  }
}
