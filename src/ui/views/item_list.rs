use crate::db::{Db, Item, ItemPatch};
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::KeyResult;
use crate::ui::ensure_valid_selection;
use crate::ui::modals::ItemModal;
use crate::ui::renderfns::{draw_alert, draw_placeholder, format_date, list_title, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};

/// The signed-in user's items
pub struct ItemListView {
  db: Db,
  owner: String,
  query: Query<Vec<Item>>,
  list_state: ListState,
  modal: Option<ItemModal>,
  write: Option<(Mutation<Item>, &'static str)>,
  status: Option<String>,
}

impl ItemListView {
  pub fn new(db: Db, owner: &str) -> Self {
    let query = db.use_items_by_owner(Some(owner));
    Self {
      db,
      owner: owner.to_string(),
      query,
      list_state: ListState::default(),
      modal: None,
      write: None,
      status: None,
    }
  }

  fn items(&self) -> &[Item] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected(&mut self) -> Option<Item> {
    let len = self.items().len();
    ensure_valid_selection(&mut self.list_state, len);
    let idx = self.list_state.selected()?;
    self.items().get(idx).cloned()
  }

  fn toggle_featured(&mut self, item: Item) {
    let db = self.db.clone();
    let patch = ItemPatch {
      name: None,
      featured: Some(!item.featured),
    };
    let write = Mutation::spawn(async move { db.update_item(&item.id, patch).await });
    self.write = Some((write, "Updated"));
  }

  fn delete(&mut self, item: Item) {
    let db = self.db.clone();
    let write = Mutation::spawn(async move { db.delete_item(&item.id).await });
    self.write = Some((write, "Deleted"));
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.items().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(list_title("Items", &self.query))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    match self.query.state() {
      QueryState::Loading | QueryState::Idle | QueryState::Disabled => {
        return draw_placeholder(frame, area, block, "Loading items...");
      }
      QueryState::Error(e) => {
        return draw_alert(frame, area, block, &e.to_string(), "Press 'r' to retry.");
      }
      QueryState::Success(items) if items.is_empty() => {
        return draw_placeholder(frame, area, block, "Nothing yet. Press 'n' to add an item.");
      }
      QueryState::Success(_) => {}
    }

    let items: Vec<ListItem> = self
      .items()
      .iter()
      .map(|item| {
        let star = if item.featured { "★ " } else { "  " };
        ListItem::new(Line::from(vec![
          Span::styled(star, Style::default().fg(Color::Yellow)),
          Span::raw(format!("{:<40}", truncate(&item.name, 40))),
          Span::styled(
            format_date(&item.created_at),
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

impl View for ItemListView {
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
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('n') => {
        self.modal = Some(ItemModal::create(self.db.clone(), &self.owner));
      }
      KeyCode::Char('e') => {
        if let Some(item) = self.selected() {
          self.modal = Some(ItemModal::rename(self.db.clone(), &item.id));
        }
      }
      KeyCode::Char('f') if self.write.is_none() => {
        if let Some(item) = self.selected() {
          self.toggle_featured(item);
        }
      }
      KeyCode::Char('d') if self.write.is_none() => {
        if let Some(item) = self.selected() {
          self.delete(item);
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    if let Some(modal) = &self.modal {
      modal.render_overlay(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Items".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();

    if let Some(modal) = &mut self.modal {
      if let Some(item) = modal.tick() {
        self.status = Some(format!("Saved '{}'", item.name));
      }
      if !modal.is_open() {
        self.modal = None;
      }
    }

    if let Some((write, verb)) = &mut self.write {
      if let Some(result) = write.poll() {
        self.status = Some(match result {
          Ok(item) => format!("{} '{}'", verb, item.name),
          Err(e) => format!("Failed: {}", e),
        });
        self.write = None;
      }
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
      ShortcutInfo::new("n", "new"),
      ShortcutInfo::new("e", "rename"),
      ShortcutInfo::new("f", "feature"),
      ShortcutInfo::new("d", "delete"),
      ShortcutInfo::new("q", "back"),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::test_support::{setup, USER_ID};
  use crate::db::NewItem;
  use crossterm::event::KeyModifiers;
  use std::time::Duration;

  #[tokio::test]
  async fn test_toggle_featured() {
    let (_backend, db) = setup();
    db.create_item(NewItem {
      owner: USER_ID.to_string(),
      name: "Pencil".to_string(),
      featured: false,
    })
    .await
    .unwrap();

    let mut view = ItemListView::new(db, USER_ID);
    for _ in 0..100 {
      view.tick();
      if view.query.data().is_some() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    view.handle_key(KeyEvent::new(KeyCode::Char('f'), KeyModifiers::NONE));
    for _ in 0..100 {
      view.tick();
      if view.items().first().is_some_and(|i| i.featured) {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(view.items()[0].featured);
    assert_eq!(view.status(), Some("Updated 'Pencil'"));
  }
}
