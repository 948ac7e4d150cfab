use crate::db::{Db, Item, ItemPatch, NewItem};
use crate::query::Query;
use crate::ui::components::{Form, FormEvent, FormField, KeyResult, ModalForm};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

const NAME: usize = 0;

enum Target {
  Create { owner: String },
  Rename { id: String, source: Query<Item>, loaded: bool },
}

/// Create or rename form for an item.
pub struct ItemModal {
  db: Db,
  target: Target,
  modal: ModalForm<Item>,
}

impl ItemModal {
  pub fn create(db: Db, owner: &str) -> Self {
    let form = Form::new("New item").field(FormField::required("Name", "Please enter a name"));
    Self {
      db,
      target: Target::Create {
        owner: owner.to_string(),
      },
      modal: ModalForm::open(form),
    }
  }

  pub fn rename(db: Db, id: &str) -> Self {
    let form = Form::new("Rename item").field(FormField::required("Name", "Please enter a name"));
    let mut modal = ModalForm::open(form);
    modal.form_mut().set_notice(Some("Loading item...".to_string()));
    Self {
      target: Target::Rename {
        id: id.to_string(),
        source: db.use_item(Some(id)),
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
    if result != KeyResult::Event(FormEvent::Submitted) {
      return result;
    }

    let name = self.modal.form().value(NAME);
    let db = self.db.clone();
    match &self.target {
      Target::Create { owner } => {
        let data = NewItem {
          owner: owner.clone(),
          name,
          featured: false,
        };
        self.modal.submit(async move { db.create_item(data).await });
      }
      Target::Rename { id, .. } => {
        let id = id.clone();
        let patch = ItemPatch {
          name: Some(name),
          featured: None,
        };
        self.modal.submit(async move { db.update_item(&id, patch).await });
      }
    }
    result
  }

  pub fn tick(&mut self) -> Option<Item> {
    if let Target::Rename { source, loaded, .. } = &mut self.target {
      if !*loaded {
        source.poll();
        let form = self.modal.form_mut();
        if let Some(item) = source.data() {
          form.set_value(NAME, &item.name);
          form.set_notice(None);
          *loaded = true;
        } else if let Some(e) = source.error() {
          form.set_notice(Some("Could not load item.".to_string()));
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
