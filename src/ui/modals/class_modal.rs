use crate::db::{Class, ClassPatch, Db, NewClass};
use crate::query::Query;
use crate::ui::components::{Form, FormEvent, FormField, KeyResult, ModalForm};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

const NAME: usize = 0;
const DESCRIPTION: usize = 1;

enum Target {
  Create { owner: String },
  Edit { id: String, source: Query<Class>, loaded: bool },
}

/// Create or edit form for a class.
pub struct ClassModal {
  db: Db,
  target: Target,
  modal: ModalForm<Class>,
}

fn form(title: &str) -> Form {
  Form::new(title)
    .field(FormField::required("Name", "Please enter a name"))
    .field(FormField::optional("Description"))
}

impl ClassModal {
  pub fn create(db: Db, owner: &str) -> Self {
    Self {
      db,
      target: Target::Create {
        owner: owner.to_string(),
      },
      modal: ModalForm::open(form("New class")),
    }
  }

  /// Edit an existing class. The form stays read-only until the class is loaded.
  pub fn edit(db: Db, id: &str) -> Self {
    let source = db.use_class(Some(id));
    let mut modal = ModalForm::open(form("Edit class"));
    modal.form_mut().set_notice(Some("Loading class...".to_string()));
    Self {
      db,
      target: Target::Edit {
        id: id.to_string(),
        source,
        loaded: false,
      },
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
    let form = self.modal.form();
    let name = form.value(NAME);
    let description = form.non_empty(DESCRIPTION);
    let db = self.db.clone();
    match &self.target {
      Target::Create { owner } => {
        let data = NewClass {
          owner: owner.clone(),
          name,
          description,
        };
        self.modal.submit(async move { db.create_class(data).await });
      }
      Target::Edit { id, .. } => {
        let id = id.clone();
        let patch = ClassPatch {
          name: Some(name),
          description,
        };
        self.modal.submit(async move { db.update_class(&id, patch).await });
      }
    }
  }

  /// Poll the source row and the pending write. Returns the saved class.
  pub fn tick(&mut self) -> Option<Class> {
    if let Target::Edit { source, loaded, .. } = &mut self.target {
      if !*loaded {
        source.poll();
        let form = self.modal.form_mut();
        if let Some(class) = source.data() {
          form.set_value(NAME, &class.name);
          form.set_value(DESCRIPTION, class.description.as_deref().unwrap_or_default());
          form.set_notice(None);
          *loaded = true;
        } else if let Some(e) = source.error() {
          form.set_notice(Some("Could not load class.".to_string()));
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
