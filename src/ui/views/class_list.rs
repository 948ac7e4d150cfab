use crate::db::{Class, Db};
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::KeyResult;
use crate::ui::ensure_valid_selection;
use crate::ui::modals::{ClassModal, DocumentModal};
use crate::ui::renderfns::{draw_alert, draw_placeholder, format_date, list_title, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::DocumentListView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::path::PathBuf;

/// Dashboard of the signed-in user's classes
pub struct ClassListView {
  db: Db,
  owner: String,
  downloads: PathBuf,
  query: Query<Vec<Class>>,
  list_state: ListState,
  class_modal: Option<ClassModal>,
  upload_modal: Option<DocumentModal>,
  delete: Option<Mutation<Class>>,
  alert: Option<String>,
  status: Option<String>,
}

impl ClassListView {
  pub fn new(db: Db, owner: &str, downloads: PathBuf) -> Self {
    let query = db.use_classes_by_owner(Some(owner));
    Self {
      db,
      owner: owner.to_string(),
      downloads,
      query,
      list_state: ListState::default(),
      class_modal: None,
      upload_modal: None,
      delete: None,
      alert: None,
      status: None,
    }
  }

  fn classes(&self) -> &[Class] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected(&mut self) -> Option<Class> {
    let len = self.classes().len();
    ensure_valid_selection(&mut self.list_state, len);
    let idx = self.list_state.selected()?;
    self.classes().get(idx).cloned()
  }

  fn start_delete(&mut self, class: Class) {
    if self.delete.is_some() {
      return;
    }
    let db = self.db.clone();
    self.status = Some(format!("Deleting '{}'...", class.name));
    self.delete = Some(Mutation::spawn(async move { db.delete_class(&class.id).await }));
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.classes().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(list_title("Classes", &self.query))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    match self.query.state() {
      QueryState::Loading | QueryState::Idle | QueryState::Disabled => {
        draw_placeholder(frame, area, block, "Loading classes...");
        return;
      }
      QueryState::Error(e) => {
        draw_alert(frame, area, block, &e.to_string(), "Press 'r' to retry.");
        return;
      }
      QueryState::Success(classes) if classes.is_empty() => {
        draw_placeholder(
          frame,
          area,
          block,
          "Nothing yet. Press 'n' to create your first class.",
        );
        return;
      }
      QueryState::Success(_) => {}
    }

    let items: Vec<ListItem> = self
      .classes()
      .iter()
      .map(|class| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<28}", truncate(&class.name, 28)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(format!(
            "{:<40}",
            truncate(class.description.as_deref().unwrap_or_default(), 40)
          )),
          Span::raw(" "),
          Span::styled(
            format_date(&class.created_at),
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

impl View for ClassListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(modal) = &mut self.class_modal {
      if modal.handle_key(key) != KeyResult::NotHandled && !modal.is_open() {
        self.class_modal = None;
      }
      return ViewAction::None;
    }
    if let Some(modal) = &mut self.upload_modal {
      if modal.handle_key(key) != KeyResult::NotHandled && !modal.is_open() {
        self.upload_modal = None;
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
      KeyCode::Char('n') => {
        self.class_modal = Some(ClassModal::create(self.db.clone(), &self.owner));
      }
      KeyCode::Char('e') => {
        if let Some(class) = self.selected() {
          self.class_modal = Some(ClassModal::edit(self.db.clone(), &class.id));
        }
      }
      KeyCode::Char('d') => {
        if let Some(class) = self.selected() {
          self.start_delete(class);
        }
      }
      KeyCode::Char('u') => {
        if let Some(class) = self.selected() {
          self.upload_modal = Some(DocumentModal::upload(self.db.clone(), &class.id));
        }
      }
      KeyCode::Enter | KeyCode::Char('o') => {
        if let Some(class) = self.selected() {
          return ViewAction::Push(Box::new(DocumentListView::new(
            self.db.clone(),
            class,
            self.downloads.clone(),
          )));
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

    if let Some(modal) = &self.class_modal {
      modal.render_overlay(frame, area);
    }
    if let Some(modal) = &self.upload_modal {
      modal.render_overlay(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Classes".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();

    if let Some(modal) = &mut self.class_modal {
      if let Some(class) = modal.tick() {
        self.status = Some(format!("Saved '{}'", class.name));
      }
      if !modal.is_open() {
        self.class_modal = None;
      }
    }
    if let Some(modal) = &mut self.upload_modal {
      if let Some(document) = modal.tick() {
        self.status = Some(format!("Uploaded '{}'", document.title));
      }
      if !modal.is_open() {
        self.upload_modal = None;
      }
    }
    if let Some(result) = self.delete.as_mut().and_then(Mutation::poll) {
      self.delete = None;
      match result {
        Ok(class) => {
          self.alert = None;
          self.status = Some(format!("Deleted '{}'", class.name));
        }
        Err(e) => {
          self.status = None;
          self.alert = Some(e.to_string());
        }
      }
    }
  }

  fn has_modal(&self) -> bool {
    self.class_modal.is_some() || self.upload_modal.is_some()
  }

  fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("enter", "documents"),
      ShortcutInfo::new("n", "new"),
      ShortcutInfo::new("e", "edit"),
      ShortcutInfo::new("d", "delete"),
      ShortcutInfo::new("u", "upload"),
      ShortcutInfo::new("r", "refresh"),
      ShortcutInfo::new(":", "command"),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::test_support::{setup, USER_ID};
  use crate::db::NewClass;
  use crossterm::event::KeyModifiers;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn tick_until(view: &mut ClassListView, done: impl Fn(&ClassListView) -> bool) {
    for _ in 0..100 {
      view.tick();
      if done(view) {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  }

  async fn seeded(names: &[&str]) -> ClassListView {
    let (_backend, db) = setup();
    for name in names {
      db.create_class(NewClass {
        owner: USER_ID.to_string(),
        name: name.to_string(),
        description: None,
      })
      .await
      .unwrap();
    }
    let mut view = ClassListView::new(db, USER_ID, PathBuf::from("downloads"));
    tick_until(&mut view, |v| v.query.data().is_some()).await;
    view
  }

  #[tokio::test]
  async fn test_empty_then_created_via_modal() {
    let mut view = seeded(&[]).await;
    assert!(view.classes().is_empty());

    view.handle_key(key(KeyCode::Char('n')));
    assert!(view.has_modal());
    for c in "Physics".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    view.handle_key(key(KeyCode::Enter));

    tick_until(&mut view, |v| !v.has_modal() && v.classes().len() == 1).await;
    assert_eq!(view.classes()[0].name, "Physics");
    assert_eq!(view.status(), Some("Saved 'Physics'"));
  }

  #[tokio::test]
  async fn test_delete_is_immediate() {
    let mut view = seeded(&["Algebra", "Biology"]).await;
    // newest first
    assert_eq!(view.classes()[0].name, "Biology");

    view.handle_key(key(KeyCode::Char('d')));
    tick_until(&mut view, |v| v.classes().len() == 1).await;
    assert_eq!(view.classes()[0].name, "Algebra");
    assert_eq!(view.status(), Some("Deleted 'Biology'"));
  }

  #[tokio::test]
  async fn test_enter_opens_documents() {
    let mut view = seeded(&["Algebra"]).await;
    match view.handle_key(key(KeyCode::Enter)) {
      ViewAction::Push(next) => assert_eq!(next.breadcrumb_label(), "Algebra"),
      _ => panic!("expected the document list to be pushed"),
    }
  }

  #[tokio::test]
  async fn test_modal_captures_quit_key() {
    let mut view = seeded(&[]).await;
    view.handle_key(key(KeyCode::Char('n')));
    assert!(matches!(view.handle_key(key(KeyCode::Char('q'))), ViewAction::None));
    view.handle_key(key(KeyCode::Esc));
    assert!(!view.has_modal());
    assert!(matches!(view.handle_key(key(KeyCode::Char('q'))), ViewAction::Pop));
  }
}
