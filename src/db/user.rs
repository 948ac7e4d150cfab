use tracing::info;

use super::types::{NewUser, User, UserPatch};
use super::{fetch_single, first_row, to_row, Db};
use crate::backend::{AuthUser, DbResult, Filter, Select};
use crate::cache::{QueryFilter, QueryKey};
use crate::query::Query;

const TABLE: &str = "users";

/// Profile columns plus the embedded billing record.
const COLUMNS: &str = "*, customers ( * )";

fn select_user(uid: &str) -> Select {
  Select::from(TABLE).columns(COLUMNS).eq("id", uid)
}

impl Db {
  /// Fetch a user's profile. Disabled until `uid` is known.
  pub fn use_user(&self, uid: Option<&str>) -> Query<User> {
    let key = QueryKey::new("user").param("uid", uid.unwrap_or_default());
    self.use_query(key, uid, |backend, uid| {
      fetch_single(backend, select_user(&uid))
    })
  }

  /// Fetch a user's profile without going through the cache.
  pub async fn get_user(&self, uid: &str) -> DbResult<User> {
    fetch_single(self.backend.clone(), select_user(uid)).await
  }

  pub async fn create_user(&self, data: NewUser) -> DbResult<User> {
    info!(id = %data.id, "Creating user");
    let rows = self.backend.insert(TABLE, vec![to_row(&data)?]).await?;
    let user = first_row(rows, TABLE)?;
    self.queries.invalidate(QueryFilter::all("users"))?;
    Ok(user)
  }

  pub async fn update_user(&self, uid: &str, data: UserPatch) -> DbResult<User> {
    info!(%uid, "Updating user");
    let rows = self
      .backend
      .update(TABLE, &Filter::new().eq("id", uid), to_row(&data)?)
      .await?;
    let user = first_row(rows, TABLE)?;
    self.queries.invalidate(QueryKey::new("user").param("uid", uid))?;
    Ok(user)
  }

  /// Load the profile of a signed-in user, creating it on first sign-in.
  ///
  /// A stored email that differs from the sign-in email is updated.
  pub async fn ensure_user(&self, auth: &AuthUser) -> DbResult<User> {
    match self.get_user(&auth.id).await {
      Ok(user) if auth.email.is_some() && user.email != auth.email => {
        self
          .update_user(
            &auth.id,
            UserPatch {
              email: auth.email.clone(),
              ..Default::default()
            },
          )
          .await
      }
      Ok(user) => Ok(user),
      Err(e) if e.is_not_found() => {
        self
          .create_user(NewUser {
            id: auth.id.clone(),
            email: auth.email.clone(),
            name: None,
          })
          .await
      }
      Err(e) => Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::Backend;
  use crate::db::test_support::{settle, setup, USER_ID};
  use serde_json::json;

  fn auth() -> AuthUser {
    AuthUser {
      id: USER_ID.to_string(),
      email: Some("ada@example.com".to_string()),
    }
  }

  #[tokio::test]
  async fn test_ensure_user_creates_once() {
    let (backend, db) = setup();
    let first = db.ensure_user(&auth()).await.unwrap();
    let second = db.ensure_user(&auth()).await.unwrap();

    assert_eq!(first.id, USER_ID);
    assert_eq!(second.email.as_deref(), Some("ada@example.com"));
    assert_eq!(backend.rows(TABLE).len(), 1);
  }

  #[tokio::test]
  async fn test_use_user_embeds_customer() {
    let (backend, db) = setup();
    db.ensure_user(&auth()).await.unwrap();
    backend
      .insert(
        "customers",
        vec![json!({"id": USER_ID, "stripe_customer_id": "cus_123"})],
      )
      .await
      .unwrap();

    let mut query = db.use_user(Some(USER_ID));
    let user = settle(&mut query).await.data().unwrap().clone();
    assert_eq!(
      user.customers.and_then(|c| c.stripe_customer_id).as_deref(),
      Some("cus_123")
    );
  }

  #[tokio::test]
  async fn test_update_user_refreshes_profile() {
    let (_backend, db) = setup();
    db.ensure_user(&auth()).await.unwrap();
    let mut query = db.use_user(Some(USER_ID));
    assert_eq!(settle(&mut query).await.data().unwrap().name, None);

    db.update_user(
      USER_ID,
      UserPatch {
        name: Some("Ada".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap();

    let user = settle(&mut query).await.data().unwrap().clone();
    assert_eq!(user.name.as_deref(), Some("Ada"));
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
  }

  #[tokio::test]
  async fn test_ensure_user_syncs_changed_email() {
    let (backend, db) = setup();
    db.ensure_user(&auth()).await.unwrap();

    let moved = AuthUser {
      id: USER_ID.to_string(),
      email: Some("ada@lovelace.dev".to_string()),
    };
    let user = db.ensure_user(&moved).await.unwrap();
    assert_eq!(user.email.as_deref(), Some("ada@lovelace.dev"));
    assert_eq!(backend.rows(TABLE).len(), 1);

    let anonymous = AuthUser {
      id: USER_ID.to_string(),
      email: None,
    };
    let user = db.ensure_user(&anonymous).await.unwrap();
    assert_eq!(user.email.as_deref(), Some("ada@lovelace.dev"));
  }

  #[tokio::test]
  async fn test_get_user_missing_is_not_found() {
    let (_backend, db) = setup();
    assert!(db.get_user("ghost").await.unwrap_err().is_not_found());
  }
}
