//! Backend speaking the hosted Supabase HTTP APIs: PostgREST for tables,
//! Storage for the object bucket and GoTrue for auth.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::RwLock;
use tracing::debug;
use url::Url;

use super::{AuthUser, Backend, DbError, DbResult, Filter, Select};

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct ApiRestError {
  #[serde(default)]
  code: Option<String>,
  #[serde(default)]
  message: String,
}

/// Error body returned by the storage API.
#[derive(Debug, Deserialize)]
struct ApiStorageError {
  #[serde(default)]
  message: String,
  #[serde(default)]
  error: Option<String>,
}

/// Error body returned by the auth API. Older versions use `error_description`.
#[derive(Debug, Deserialize)]
struct ApiAuthError {
  #[serde(default)]
  msg: Option<String>,
  #[serde(default)]
  error_description: Option<String>,
  #[serde(default)]
  message: Option<String>,
}

impl ApiAuthError {
  fn into_message(self, status: StatusCode) -> String {
    self
      .msg
      .or(self.error_description)
      .or(self.message)
      .unwrap_or_else(|| status.to_string())
  }
}

#[derive(Debug, Deserialize)]
struct ApiSession {
  access_token: String,
  user: AuthUser,
}

/// Supabase client bound to one project.
pub struct SupabaseBackend {
  http: reqwest::Client,
  base: Url,
  anon_key: String,
  session: RwLock<Option<ApiSession>>,
}

impl SupabaseBackend {
  pub fn new(url: &str, anon_key: String) -> DbResult<Self> {
    let base = Url::parse(url).map_err(|e| DbError::Transport(format!("Invalid URL {}: {}", url, e)))?;
    Ok(Self {
      http: reqwest::Client::new(),
      base,
      anon_key,
      session: RwLock::new(None),
    })
  }

  /// Sign in with email and password, keeping the session for later requests.
  pub async fn sign_in(&self, email: &str, password: &str) -> DbResult<AuthUser> {
    let mut url = self.endpoint(&["auth", "v1", "token"])?;
    url.query_pairs_mut().append_pair("grant_type", "password");

    let response = self
      .http
      .post(url)
      .header("apikey", &self.anon_key)
      .json(&serde_json::json!({ "email": email, "password": password }))
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body: ApiAuthError = response.json().await.unwrap_or(ApiAuthError {
        msg: None,
        error_description: None,
        message: None,
      });
      return Err(DbError::Auth(body.into_message(status)));
    }

    let session: ApiSession = response.json().await?;
    let user = session.user.clone();
    debug!(user = %user.id, "Signed in");
    *self
      .session
      .write()
      .map_err(|e| DbError::Auth(format!("Lock poisoned: {}", e)))? = Some(session);
    Ok(user)
  }

  fn access_token(&self) -> Option<String> {
    self
      .session
      .read()
      .ok()
      .and_then(|s| s.as_ref().map(|s| s.access_token.clone()))
  }

  fn endpoint(&self, segments: &[&str]) -> DbResult<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| DbError::Transport(format!("URL cannot be a base: {}", self.base)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn table_url(&self, table: &str, filter: &Filter) -> DbResult<Url> {
    let mut url = self.endpoint(&["rest", "v1", table])?;
    {
      let mut pairs = url.query_pairs_mut();
      for (column, value) in filter.conditions() {
        pairs.append_pair(column, &format!("eq.{}", value));
      }
    }
    Ok(url)
  }

  fn object_url(&self, bucket: &str, path: &str) -> DbResult<Url> {
    let mut segments = vec!["storage", "v1", "object", bucket];
    segments.extend(path.split('/'));
    self.endpoint(&segments)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let token = self.access_token().unwrap_or_else(|| self.anon_key.clone());
    self
      .http
      .request(method, url)
      .header("apikey", &self.anon_key)
      .bearer_auth(token)
  }

  async fn rest_rows(&self, response: Response) -> DbResult<Vec<Value>> {
    let status = response.status();
    if status.is_success() {
      return Ok(response.json().await?);
    }
    let body: ApiRestError = response.json().await.unwrap_or(ApiRestError {
      code: None,
      message: status.to_string(),
    });
    Err(DbError::Provider {
      code: body.code,
      message: body.message,
    })
  }

  async fn storage_result(&self, response: Response) -> DbResult<Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body: ApiStorageError = response.json().await.unwrap_or(ApiStorageError {
      message: status.to_string(),
      error: None,
    });
    let message = if body.message.is_empty() {
      body.error.unwrap_or_else(|| status.to_string())
    } else {
      body.message
    };
    Err(DbError::Storage {
      status: Some(status.as_u16()),
      message,
    })
  }
}

#[async_trait]
impl Backend for SupabaseBackend {
  async fn select(&self, query: &Select) -> DbResult<Vec<Value>> {
    let mut url = self.table_url(&query.table, &query.filter)?;
    {
      let mut pairs = url.query_pairs_mut();
      pairs.append_pair("select", &query.columns);
      if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.append_pair("order", &format!("{}.{}", order.column, direction));
      }
    }
    debug!(%url, "select");
    let response = self.request(Method::GET, url).send().await?;
    self.rest_rows(response).await
  }

  async fn insert(&self, table: &str, rows: Vec<Value>) -> DbResult<Vec<Value>> {
    let url = self.table_url(table, &Filter::new())?;
    let response = self
      .request(Method::POST, url)
      .header("Prefer", "return=representation")
      .json(&rows)
      .send()
      .await?;
    self.rest_rows(response).await
  }

  async fn update(&self, table: &str, filter: &Filter, patch: Value) -> DbResult<Vec<Value>> {
    let url = self.table_url(table, filter)?;
    let response = self
      .request(Method::PATCH, url)
      .header("Prefer", "return=representation")
      .json(&patch)
      .send()
      .await?;
    self.rest_rows(response).await
  }

  async fn delete(&self, table: &str, filter: &Filter) -> DbResult<Vec<Value>> {
    let url = self.table_url(table, filter)?;
    let response = self
      .request(Method::DELETE, url)
      .header("Prefer", "return=representation")
      .send()
      .await?;
    self.rest_rows(response).await
  }

  async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> DbResult<()> {
    let url = self.object_url(bucket, path)?;
    let response = self
      .request(Method::POST, url)
      .header("x-upsert", "false")
      .header("content-type", "application/octet-stream")
      .body(bytes)
      .send()
      .await?;
    self.storage_result(response).await.map(|_| ())
  }

  async fn update_object(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> DbResult<()> {
    let url = self.object_url(bucket, path)?;
    let response = self
      .request(Method::PUT, url)
      .header("content-type", "application/octet-stream")
      .body(bytes)
      .send()
      .await?;
    self.storage_result(response).await.map(|_| ())
  }

  async fn download(&self, bucket: &str, path: &str) -> DbResult<Vec<u8>> {
    let url = self.object_url(bucket, path)?;
    let response = self.request(Method::GET, url).send().await?;
    let response = self.storage_result(response).await?;
    Ok(response.bytes().await?.to_vec())
  }

  fn public_url(&self, bucket: &str, path: &str) -> String {
    let mut segments = vec!["storage", "v1", "object", "public", bucket];
    segments.extend(path.split('/'));
    self
      .endpoint(&segments)
      .map(|u| u.to_string())
      .unwrap_or_else(|_| format!("{}/{}", bucket, path))
  }

  async fn current_user(&self) -> DbResult<Option<AuthUser>> {
    let token = match self.access_token() {
      Some(token) => token,
      None => return Ok(None),
    };
    let url = self.endpoint(&["auth", "v1", "user"])?;
    let response = self
      .http
      .get(url)
      .header("apikey", &self.anon_key)
      .bearer_auth(token)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body: ApiAuthError = response.json().await.unwrap_or(ApiAuthError {
        msg: None,
        error_description: None,
        message: None,
      });
      return Err(DbError::Auth(body.into_message(status)));
    }
    Ok(Some(response.json().await?))
  }
}
