use crate::backend::DbError;
use crate::db::{Class, Db, Document};
use crate::files::{open_in_browser, save_download};
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::KeyResult;
use crate::ui::ensure_valid_selection;
use crate::ui::modals::DocumentModal;
use crate::ui::renderfns::{draw_alert, draw_placeholder, format_date, list_title, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::path::PathBuf;
use tracing::info;

/// A row action running in the background
enum Pending {
  Delete(Mutation<Document>),
  Download(Mutation<PathBuf>),
}

/// Documents of one class
pub struct DocumentListView {
  db: Db,
  class: Class,
  downloads: PathBuf,
  query: Query<Vec<Document>>,
  list_state: ListState,
  modal: Option<DocumentModal>,
  pending: Option<Pending>,
  alert: Option<String>,
  status: Option<String>,
}

impl DocumentListView {
  pub fn new(db: Db, class: Class, downloads: PathBuf) -> Self {
    let query = db.use_documents_by_class(Some(&class.id));
    Self {
      db,
      class,
      downloads,
      query,
      list_state: ListState::default(),
      modal: None,
      pending: None,
      alert: None,
      status: None,
    }
  }

  fn documents(&self) -> &[Document] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected(&mut self) -> Option<Document> {
    let len = self.documents().len();
    ensure_valid_selection(&mut self.list_state, len);
    let idx = self.list_state.selected()?;
    self.documents().get(idx).cloned()
  }

  fn preview(&mut self, document: &Document) {
    let url = self.db.document_url(document);
    info!(%url, "Opening document preview");
    match open_in_browser(&url) {
      Ok(()) => self.status = Some(format!("Opened '{}'", document.title)),
      Err(e) => self.alert = Some(e.to_string()),
    }
  }

  fn start_download(&mut self, document: Document) {
    let db = self.db.clone();
    let dir = self.downloads.clone();
    self.status = Some(format!("Downloading '{}'...", document.title));
    self.pending = Some(Pending::Download(Mutation::spawn(async move {
      let bytes = db.download_document(&document).await?;
      save_download(&dir, &document.title, &bytes)
        .await
        .map_err(|e| DbError::File(e.to_string()))
    })));
  }

  fn start_delete(&mut self, document: Document) {
    let db = self.db.clone();
    self.status = Some(format!("Deleting '{}'...", document.title));
    self.pending = Some(Pending::Delete(Mutation::spawn(async move {
      db.delete_document(&document.id).await
    })));
  }

  /// Poll the pending row action, returning its outcome message
  fn poll_pending(&mut self) -> Option<Result<String, DbError>> {
    let outcome = match self.pending.as_mut()? {
      Pending::Delete(write) => write
        .poll()?
        .map(|document| format!("Deleted '{}'", document.title)),
      Pending::Download(write) => write
        .poll()?
        .map(|path| format!("Saved to {}", path.display())),
    };
    self.pending = None;
    Some(outcome)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.documents().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(list_title(&self.class.name, &self.query))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    match self.query.state() {
      QueryState::Loading | QueryState::Idle | QueryState::Disabled => {
        draw_placeholder(frame, area, block, "Loading documents...");
        return;
      }
      QueryState::Error(e) => {
        draw_alert(frame, area, block, &e.to_string(), "Press 'r' to retry.");
        return;
      }
      QueryState::Success(documents) if documents.is_empty() => {
        draw_placeholder(
          frame,
          area,
          block,
          "No documents in this class yet. Press 'u' to upload one.",
        );
        return;
      }
      QueryState::Success(_) => {}
    }

    let items: Vec<ListItem> = self
      .documents()
      .iter()
      .map(|document| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<36}", truncate(&document.title, 36)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::styled(
            format!("{:<32}", truncate(&document.file_path, 32)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw(" "),
          Span::styled(
            format_date(&document.created_at),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for DocumentListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(modal) = &mut self.modal {
      if modal.handle_key(key) != KeyResult::NotHandled && !modal.is_open() {
        self.modal = None;
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => {
        self.alert = None;
        self.query.refetch();
      }
      KeyCode::Char('u') => {
        self.modal = Some(DocumentModal::upload(self.db.clone(), &self.class.id));
      }
      KeyCode::Char('e') => {
        if let Some(document) = self.selected() {
          self.modal = Some(DocumentModal::edit(self.db.clone(), &document.id));
        }
      }
      KeyCode::Char('p') | KeyCode::Enter => {
        if let Some(document) = self.selected() {
          self.preview(&document);
        }
      }
      KeyCode::Char('s') if self.pending.is_none() => {
        if let Some(document) = self.selected() {
          self.start_download(document);
        }
      }
      KeyCode::Char('d') if self.pending.is_none() => {
        if let Some(document) = self.selected() {
          self.start_delete(document);
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let list_area = match &self.alert {
      Some(alert) => {
        let chunks = Layout::default()
          .direction(Direction::Vertical)
          .constraints([Constraint::Length(1), Constraint::Min(1)])
          .split(area);
        let line = Paragraph::new(format!(" ! {}", alert))
          .style(Style::default().fg(Color::Red).bold());
        frame.render_widget(line, chunks[0]);
        chunks[1]
      }
      None => area,
    };
    self.render_list(frame, list_area);

    if let Some(modal) = &self.modal {
      modal.render_overlay(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    self.class.name.clone()
  }

  fn tick(&mut self) {
    self.query.poll();

    if let Some(modal) = &mut self.modal {
      if let Some(document) = modal.tick() {
        self.status = Some(format!("Saved '{}'", document.title));
      }
      if !modal.is_open() {
        self.modal = None;
      }
    }

    match self.poll_pending() {
      Some(Ok(message)) => {
        self.alert = None;
        self.status = Some(message);
      }
      Some(Err(e)) => {
        self.status = None;
        self.alert = Some(e.to_string());
      }
      None => {}
    }
  }

  fn has_modal(&self) -> bool {
    self.modal.is_some()
  }

  fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("p", "preview"),
      ShortcutInfo::new("s", "download"),
      ShortcutInfo::new("u", "upload"),
      ShortcutInfo::new("e", "edit"),
      ShortcutInfo::new("d", "delete"),
      ShortcutInfo::new("q", "back"),
    ]
  }
}
