use crate::backend::{DbError, DbResult};
use crate::db::{Db, Document, DocumentForm};
use crate::files::FileUpload;
use crate::query::Query;
use crate::ui::components::{Form, FormEvent, FormField, KeyResult, ModalForm};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use std::path::PathBuf;

const TITLE: usize = 0;
const FILE: usize = 1;

enum Target {
  Upload { class_id: String },
  Edit { id: String, source: Query<Document>, loaded: bool },
}

/// Upload form for a new document, or rename/replace form for an existing one.
pub struct DocumentModal {
  db: Db,
  target: Target,
  modal: ModalForm<Document>,
}

impl DocumentModal {
  pub fn upload(db: Db, class_id: &str) -> Self {
    let form = Form::new("Upload document")
      .field(FormField::required("Title", "Please enter a title"))
      .field(FormField::required("File", "Please select a file").hint("path on this machine"));
    Self {
      db,
      target: Target::Upload {
        class_id: class_id.to_string(),
      },
      modal: ModalForm::open(form),
    }
  }

  pub fn edit(db: Db, id: &str) -> Self {
    let form = Form::new("Edit document")
      .field(FormField::required("Title", "Please enter a title"))
      .field(FormField::optional("Replace file").hint("leave empty to keep the current file"));
    let mut modal = ModalForm::open(form);
    modal.form_mut().set_notice(Some("Loading document...".to_string()));
    Self {
      target: Target::Edit {
        id: id.to_string(),
        source: db.use_document(Some(id)),
        loaded: false,
      },
      db,
      modal,
    }
  }

  pub fn is_open(&self) -> bool {
    self.modal.is_open()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    let result = self.modal.handle_key(key);
    if result == KeyResult::Event(FormEvent::Submitted) {
      self.submit();
    }
    result
  }

  fn submit(&mut self) {
    let title = self.modal.form().value(TITLE);
    let path = self.modal.form().non_empty(FILE).map(PathBuf::from);
    let db = self.db.clone();
    match &self.target {
      Target::Upload { class_id } => {
        let class_id = class_id.clone();
        self.modal.submit(async move {
          let file = read_upload(path).await?;
          db.create_document(&class_id, DocumentForm::new(title, file))
            .await
        });
      }
      Target::Edit { id, .. } => {
        let id = id.clone();
        self.modal.submit(async move {
          let file = read_upload(path).await?;
          db.update_document(&id, DocumentForm::new(title, file)).await
        });
      }
    }
  }

  /// Poll the source row and the pending write. Returns the saved document.
  pub fn tick(&mut self) -> Option<Document> {
    if let Target::Edit { source, loaded, .. } = &mut self.target {
      if !*loaded {
        source.poll();
        let form = self.modal.form_mut();
        if let Some(document) = source.data() {
          form.set_value(TITLE, &document.title);
          form.set_notice(None);
          *loaded = true;
        } else if let Some(e) = source.error() {
          form.set_notice(Some("Could not load document.".to_string()));
          form.set_alert(Some(e.to_string()));
        }
      }
    }
    self.modal.tick()
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    self.modal.render_overlay(frame, area);
  }
}

async fn read_upload(path: Option<PathBuf>) -> DbResult<Option<FileUpload>> {
  match path {
    Some(path) => FileUpload::read(&path)
      .await
      .map(Some)
      .map_err(|e| DbError::File(e.to_string())),
    None => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::test_support::setup;
  use crossterm::event::{KeyCode, KeyModifiers};
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(modal: &mut DocumentModal, text: &str) {
    for c in text.chars() {
      modal.handle_key(key(KeyCode::Char(c)));
    }
  }

  async fn settle(modal: &mut DocumentModal) -> Option<Document> {
    for _ in 0..100 {
      if let Some(document) = modal.tick() {
        return Some(document);
      }
      if !modal.modal.state().is_pending() {
        return None;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    None
  }

  #[tokio::test]
  async fn test_upload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.pdf");
    tokio::fs::write(&source, b"%PDF").await.unwrap();

    let (backend, db) = setup();
    let mut modal = DocumentModal::upload(db, "c1");
    type_text(&mut modal, "Report");
    modal.handle_key(key(KeyCode::Tab));
    type_text(&mut modal, &source.to_string_lossy());
    modal.handle_key(key(KeyCode::Enter));

    let document = settle(&mut modal).await.unwrap();
    assert_eq!(document.title, "Report");
    assert!(document.file_path.starts_with("c1/"));
    assert_eq!(
      backend.object("documents", &document.file_path),
      Some(b"%PDF".to_vec())
    );
    assert!(!modal.is_open());
  }

  #[tokio::test]
  async fn test_file_is_required_for_upload() {
    let (_backend, db) = setup();
    let mut modal = DocumentModal::upload(db, "c1");
    type_text(&mut modal, "Report");
    modal.handle_key(key(KeyCode::Enter));
    assert_eq!(modal.modal.form().field_error(FILE), Some("Please select a file"));
    assert!(modal.modal.state().is_open());
    assert!(!modal.modal.state().is_pending());
    assert_eq!(modal.modal.state().error(), None);
  }

  #[tokio::test]
  async fn test_unreadable_file_shows_alert() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, db) = setup();
    let mut modal = DocumentModal::upload(db, "c1");
    type_text(&mut modal, "Report");
    modal.handle_key(key(KeyCode::Tab));
    type_text(&mut modal, &dir.path().join("missing.pdf").to_string_lossy());
    modal.handle_key(key(KeyCode::Enter));

    assert_eq!(settle(&mut modal).await, None);
    assert!(modal.modal.state().error().is_some());
    assert!(modal
      .modal
      .form()
      .alert()
      .is_some_and(|a| a.starts_with("Failed to read")));
    assert!(backend.rows("documents").is_empty());
  }
}
