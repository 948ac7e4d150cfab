use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::types::{Document, DocumentForm};
use super::{fetch_list, fetch_single, first_row, Db};
use crate::backend::{DbError, DbResult, Filter, Select, CREATED_AT};
use crate::cache::{QueryFilter, QueryKey};
use crate::files::FileUpload;
use crate::query::Query;

const TABLE: &str = "documents";

/// Object path for a new upload: `{class_id}/{unix millis}.{extension}`.
pub fn storage_path(class_id: &str, file: &FileUpload, now: DateTime<Utc>) -> String {
  format!("{}/{}.{}", class_id, now.timestamp_millis(), file.extension())
}

impl Db {
  pub fn use_document(&self, id: Option<&str>) -> Query<Document> {
    let key = QueryKey::new("document").param("id", id.unwrap_or_default());
    self.use_query(key, id, |backend, id| {
      fetch_single(backend, Select::from(TABLE).eq("id", id))
    })
  }

  /// Fetch all documents of a class, newest first.
  pub fn use_documents_by_class(&self, class_id: Option<&str>) -> Query<Vec<Document>> {
    let key = QueryKey::new("documents").param("class_id", class_id.unwrap_or_default());
    self.use_query(key, class_id, |backend, class_id| {
      fetch_list(
        backend,
        Select::from(TABLE)
          .eq("class_id", class_id)
          .order_desc(CREATED_AT),
      )
    })
  }

  /// Upload the file, then record it under the signed-in user.
  ///
  /// Nothing is written when the upload fails. When the row cannot be
  /// written after a successful upload, the stored object is left behind.
  pub async fn create_document(&self, class_id: &str, form: DocumentForm) -> DbResult<Document> {
    let title = form.validated_title()?.to_string();
    let file = form
      .file
      .ok_or_else(|| DbError::Validation("Please select a file".to_string()))?;

    let path = storage_path(class_id, &file, Utc::now());
    info!(%class_id, %path, "Uploading document");
    self.backend.upload(&self.bucket, &path, file.bytes).await?;

    let row = async {
      let user = self.current_user().await?;
      let rows = self
        .backend
        .insert(
          TABLE,
          vec![json!({
            "class_id": class_id,
            "title": title,
            "file_path": path,
            "owner_id": user.id,
          })],
        )
        .await?;
      first_row::<Document>(rows, TABLE)
    }
    .await;

    let document = match row {
      Ok(document) => document,
      Err(e) => {
        warn!(%path, error = %e, "Document row not written, uploaded object left in storage");
        return Err(e);
      }
    };
    self
      .queries
      .invalidate(QueryKey::new("documents").param("class_id", class_id))?;
    Ok(document)
  }

  /// Rename a document and, when a file is given, replace its stored content.
  pub async fn update_document(&self, id: &str, form: DocumentForm) -> DbResult<Document> {
    let title = form.validated_title()?.to_string();
    info!(%id, "Updating document");

    if let Some(file) = form.file {
      let existing: Document =
        fetch_single(self.backend.clone(), Select::from(TABLE).eq("id", id)).await?;
      self
        .backend
        .update_object(&self.bucket, &existing.file_path, file.bytes)
        .await?;
    }

    let rows = self
      .backend
      .update(TABLE, &Filter::new().eq("id", id), json!({ "title": title }))
      .await?;
    let document = first_row(rows, TABLE)?;
    self.invalidate_document(id)?;
    Ok(document)
  }

  /// Remove the document row. The stored object is kept.
  pub async fn delete_document(&self, id: &str) -> DbResult<Document> {
    info!(%id, "Deleting document");
    let rows = self
      .backend
      .delete(TABLE, &Filter::new().eq("id", id))
      .await?;
    let document = first_row(rows, TABLE)?;
    self.invalidate_document(id)?;
    Ok(document)
  }

  pub async fn download_document(&self, document: &Document) -> DbResult<Vec<u8>> {
    self.backend.download(&self.bucket, &document.file_path).await
  }

  /// Public address of the document's file.
  pub fn document_url(&self, document: &Document) -> String {
    self.backend.public_url(&self.bucket, &document.file_path)
  }

  fn invalidate_document(&self, id: &str) -> DbResult<()> {
    self.queries.invalidate(QueryKey::new("document").param("id", id))?;
    self.queries.invalidate(QueryFilter::all("documents"))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{AuthUser, Backend, MemoryBackend};
  use crate::cache::QueryClient;
  use crate::db::test_support::{settle, setup, USER_ID};
  use chrono::TimeZone;
  use std::sync::Arc;

  fn pdf_form(title: &str) -> DocumentForm {
    DocumentForm::new(title, Some(FileUpload::new("a.pdf", b"%PDF-1.7".to_vec())))
  }

  #[test]
  fn test_storage_path_uses_millis_and_extension() {
    let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
    let upload = |name: &str| FileUpload::new(name, Vec::new());
    assert_eq!(storage_path("c1", &upload("a.pdf"), now), "c1/1700000000123.pdf");
    assert_eq!(storage_path("c1", &upload("notes.v2.txt"), now), "c1/1700000000123.txt");
  }

  #[tokio::test]
  async fn test_create_document_uploads_then_records() {
    let (backend, db) = setup();
    let doc = db.create_document("c1", pdf_form("Report")).await.unwrap();

    assert_eq!(doc.class_id, "c1");
    assert_eq!(doc.title, "Report");
    assert_eq!(doc.owner_id, USER_ID);
    assert!(doc.file_path.starts_with("c1/"));
    assert!(doc.file_path.ends_with(".pdf"));
    assert_eq!(
      backend.object("documents", &doc.file_path).as_deref(),
      Some(&b"%PDF-1.7"[..])
    );
    assert_eq!(backend.rows(TABLE).len(), 1);
  }

  #[tokio::test]
  async fn test_create_document_refreshes_class_list() {
    let (_backend, db) = setup();
    let mut list = db.use_documents_by_class(Some("c1"));
    assert_eq!(settle(&mut list).await.data().map(Vec::len), Some(0));

    db.create_document("c1", pdf_form("Report")).await.unwrap();
    let docs = settle(&mut list).await.data().unwrap().clone();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].title, "Report");
  }

  #[tokio::test]
  async fn test_failed_upload_writes_nothing() {
    let (backend, db) = setup();
    let storage_error = DbError::Storage {
      status: Some(413),
      message: "Payload too large".to_string(),
    };
    backend.fail_next_upload(storage_error.clone());

    let err = db.create_document("c1", pdf_form("Report")).await.unwrap_err();
    assert_eq!(err, storage_error);
    assert!(backend.rows(TABLE).is_empty());
  }

  #[tokio::test]
  async fn test_requires_signed_in_user() {
    let (backend, db) = setup();
    backend.sign_out();
    let err = db.create_document("c1", pdf_form("Report")).await.unwrap_err();
    assert_eq!(err, DbError::NotAuthenticated);
    assert!(backend.rows(TABLE).is_empty());
  }

  #[tokio::test]
  async fn test_failed_insert_leaves_object() {
    let backend = Arc::new(
      MemoryBackend::new()
        .with_user(AuthUser {
          id: USER_ID.to_string(),
          email: None,
        })
        .with_foreign_key(TABLE, "class_id", "classes"),
    );
    let db = Db::new(backend.clone(), QueryClient::default());

    let err = db.create_document("missing", pdf_form("Report")).await.unwrap_err();
    assert!(matches!(err, DbError::Provider { code: Some(ref c), .. } if c == "23503"));
    assert!(backend.select(&Select::from(TABLE)).await.unwrap().is_empty());

    let orphans = backend.object_paths("documents");
    assert_eq!(orphans.len(), 1);
    assert!(orphans[0].starts_with("missing/"));
  }

  #[tokio::test]
  async fn test_validation_happens_before_upload() {
    let (backend, db) = setup();
    let err = db
      .create_document("c1", DocumentForm::new("", None))
      .await
      .unwrap_err();
    assert_eq!(err, DbError::Validation("Please enter a title".to_string()));

    let err = db
      .create_document("c1", DocumentForm::new("Report", None))
      .await
      .unwrap_err();
    assert_eq!(err, DbError::Validation("Please select a file".to_string()));
    assert!(backend.rows(TABLE).is_empty());
  }

  #[tokio::test]
  async fn test_update_replaces_content_at_same_path() {
    let (backend, db) = setup();
    let doc = db.create_document("c1", pdf_form("Report")).await.unwrap();

    let updated = db
      .update_document(
        &doc.id,
        DocumentForm::new(
          "Final report",
          Some(FileUpload::new("b.pdf", b"%PDF-2.0".to_vec())),
        ),
      )
      .await
      .unwrap();

    assert_eq!(updated.title, "Final report");
    assert_eq!(updated.file_path, doc.file_path);
    assert_eq!(
      db.download_document(&updated).await.unwrap(),
      b"%PDF-2.0".to_vec()
    );
    assert_eq!(backend.rows(TABLE).len(), 1);
  }

  #[tokio::test]
  async fn test_failed_content_update_keeps_title() {
    let (backend, db) = setup();
    let doc = db.create_document("c1", pdf_form("Report")).await.unwrap();
    let storage_error = DbError::Storage {
      status: Some(500),
      message: "Internal storage error".to_string(),
    };
    backend.fail_next_update_object(storage_error.clone());

    let err = db
      .update_document(
        &doc.id,
        DocumentForm::new("Final report", Some(FileUpload::new("b.pdf", b"%PDF-2.0".to_vec()))),
      )
      .await
      .unwrap_err();
    assert_eq!(err, storage_error);
    assert_eq!(backend.rows(TABLE)[0]["title"], "Report");
    assert_eq!(
      backend.object("documents", &doc.file_path).as_deref(),
      Some(&b"%PDF-1.7"[..])
    );
  }

  #[tokio::test]
  async fn test_failed_title_update_after_content_replaced() {
    let (backend, db) = setup();
    let doc = db.create_document("c1", pdf_form("Report")).await.unwrap();
    let provider_error = DbError::Provider {
      code: Some("42501".to_string()),
      message: "permission denied for table documents".to_string(),
    };
    backend.fail_next_update(provider_error.clone());

    let err = db
      .update_document(
        &doc.id,
        DocumentForm::new("Final report", Some(FileUpload::new("b.pdf", b"%PDF-2.0".to_vec()))),
      )
      .await
      .unwrap_err();
    assert_eq!(err, provider_error);
    assert_eq!(backend.rows(TABLE)[0]["title"], "Report");
    // the object write already happened and is not rolled back
    assert_eq!(
      backend.object("documents", &doc.file_path).as_deref(),
      Some(&b"%PDF-2.0"[..])
    );
  }

  #[tokio::test]
  async fn test_delete_keeps_stored_object() {
    let (backend, db) = setup();
    let doc = db.create_document("c1", pdf_form("Report")).await.unwrap();
    let mut query = db.use_document(Some(&doc.id));
    assert!(settle(&mut query).await.is_success());

    db.delete_document(&doc.id).await.unwrap();
    assert!(settle(&mut query).await.error().is_some_and(|e| e.is_not_found()));
    assert!(backend.object("documents", &doc.file_path).is_some());
  }

  #[test]
  fn test_document_url() {
    let (_backend, db) = setup();
    let doc: Document = serde_json::from_value(json!({
      "id": "d1",
      "class_id": "c1",
      "owner_id": USER_ID,
      "title": "Report",
      "file_path": "c1/1.pdf",
      "createdAt": "2024-03-01T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(db.document_url(&doc), "memory://documents/c1/1.pdf");
  }
}
