use crate::backend::{AuthUser, MemoryBackend, SupabaseBackend};
use crate::cache::QueryClient;
use crate::config::Config;
use crate::db::{Db, DocumentForm, NewClass, NewItem, User};
use crate::event::{Event, EventHandler};
use crate::files::FileUpload;
use crate::query::Query;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::{draw_footer, draw_header, host_of};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{ClassListView, ItemListView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEMO_USER: &str = "demo-user";

/// Main application state
pub struct App {
  db: Db,
  user: AuthUser,
  /// Header title
  title: String,
  downloads: PathBuf,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` command prompt
  command_input: CommandInput,

  /// Profile of the signed-in user, shown in the header
  profile: Query<User>,

  /// Result of the last command, e.g. an unknown command name
  message: Option<String>,

  should_quit: bool,
}

impl App {
  /// Sign in against the configured backend.
  pub async fn connect(config: &Config) -> Result<Self> {
    let anon_key = Config::get_anon_key()?;
    let password = Config::get_password()?;

    let backend = SupabaseBackend::new(&config.backend.url, anon_key)?;
    let user = backend.sign_in(&config.auth.email, &password).await?;
    info!(user = %user.id, "Signed in");

    let db = Db::new(Arc::new(backend), QueryClient::default()).with_bucket(&config.backend.bucket);
    db.ensure_user(&user).await?;

    let title = config
      .title
      .clone()
      .unwrap_or_else(|| host_of(&config.backend.url).to_string());
    Ok(Self::with_session(db, user, title, config.download_dir()))
  }

  /// Run against an in-process backend seeded with sample data.
  pub async fn demo(downloads: PathBuf) -> Result<Self> {
    let user = AuthUser {
      id: DEMO_USER.to_string(),
      email: Some("demo@classdesk.local".to_string()),
    };
    let backend = MemoryBackend::new()
      .with_user(user.clone())
      .with_foreign_key("classes", "owner", "users")
      .with_foreign_key("items", "owner", "users")
      .with_foreign_key("documents", "class_id", "classes");
    let db = Db::new(Arc::new(backend), QueryClient::default());
    seed_demo(&db, &user).await?;
    info!("Running in demo mode");
    Ok(Self::with_session(db, user, "classdesk demo".to_string(), downloads))
  }

  fn with_session(db: Db, user: AuthUser, title: String, downloads: PathBuf) -> Self {
    let profile = db.use_user(Some(&user.id));
    let root: Box<dyn View> = Box::new(ClassListView::new(db.clone(), &user.id, downloads.clone()));
    Self {
      db,
      user,
      title,
      downloads,
      view_stack: vec![root],
      command_input: CommandInput::new(),
      profile,
      message: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let result = self.event_loop().await;

    // restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    result
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(Duration::from_millis(100));

    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        Some(Event::Resize) => {}
        None => break,
      }
    }
    Ok(())
  }

  fn tick(&mut self) {
    self.profile.poll();
    if let Some(view) = self.view_stack.last_mut() {
      view.tick();
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let modal_open = self.view_stack.last().is_some_and(|v| v.has_modal());
    if self.command_input.is_active() || !modal_open {
      match self.command_input.handle_key(key) {
        KeyResult::NotHandled => {}
        KeyResult::Handled => return,
        KeyResult::Event(CommandEvent::Submitted(name)) => {
          self.execute_command(name);
          return;
        }
        KeyResult::Event(CommandEvent::Unknown(input)) => {
          self.message = Some(format!("Unknown command: {}", input));
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) => return,
      }
    }

    self.message = None;
    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute_command(&mut self, name: &str) {
    let root: Box<dyn View> = match name {
      "classes" => Box::new(ClassListView::new(
        self.db.clone(),
        &self.user.id,
        self.downloads.clone(),
      )),
      "items" => Box::new(ItemListView::new(self.db.clone(), &self.user.id)),
      "refresh" => {
        self.message = Some(match self.db.queries().clear() {
          Ok(()) => "Reloading...".to_string(),
          Err(e) => format!("Refresh failed: {}", e),
        });
        return;
      }
      "quit" => {
        self.should_quit = true;
        return;
      }
      _ => return,
    };
    self.message = None;
    self.view_stack = vec![root];
  }

  fn draw(&mut self, frame: &mut Frame) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1), // Header
        Constraint::Min(1),    // Main content
        Constraint::Length(1), // Footer
      ])
      .split(frame.area());

    let user_label = match self.profile.data() {
      Some(profile) => profile.display_name().to_string(),
      None => self.user.email.clone().unwrap_or_else(|| self.user.id.clone()),
    };
    let shortcuts = self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default();
    draw_header(frame, chunks[0], &self.title, Some(user_label.as_str()), &shortcuts);

    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, chunks[1]);
    }
    self.command_input.render_overlay(frame, chunks[1]);

    let breadcrumb: Vec<String> = self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect();
    let status = self
      .message
      .as_deref()
      .or_else(|| self.view_stack.last().and_then(|v| v.status()));
    draw_footer(frame, chunks[2], &breadcrumb, status);
  }
}

/// Sample rows for demo mode
async fn seed_demo(db: &Db, user: &AuthUser) -> Result<()> {
  db.ensure_user(user).await?;
  let class = db
    .create_class(NewClass {
      owner: user.id.clone(),
      name: "Introduction to Algebra".to_string(),
      description: Some("Tuesdays and Thursdays".to_string()),
    })
    .await?;
  db.create_document(
    &class.id,
    DocumentForm::new(
      "Syllabus",
      Some(FileUpload::new("syllabus.txt", b"Week 1: linear equations\n".to_vec())),
    ),
  )
  .await?;
  db.create_item(NewItem {
    owner: user.id.clone(),
    name: "Graph paper".to_string(),
    featured: true,
  })
  .await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_command(app: &mut App, command: &str) {
    app.handle_key(key(KeyCode::Char(':')));
    for c in command.chars() {
      app.handle_key(key(KeyCode::Char(c)));
    }
    app.handle_key(key(KeyCode::Enter));
  }

  #[tokio::test]
  async fn test_demo_starts_on_classes() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::demo(dir.path().to_path_buf()).await.unwrap();
    assert_eq!(app.view_stack.len(), 1);
    assert_eq!(app.view_stack[0].breadcrumb_label(), "Classes");
    assert_eq!(app.title, "classdesk demo");
  }

  #[tokio::test]
  async fn test_commands_replace_root() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::demo(dir.path().to_path_buf()).await.unwrap();

    type_command(&mut app, "items");
    assert_eq!(app.view_stack.len(), 1);
    assert_eq!(app.view_stack[0].breadcrumb_label(), "Items");

    type_command(&mut app, "nope");
    assert_eq!(app.message.as_deref(), Some("Unknown command: nope"));

    type_command(&mut app, "refresh");
    assert_eq!(app.message.as_deref(), Some("Reloading..."));
    assert_eq!(app.view_stack[0].breadcrumb_label(), "Items");

    type_command(&mut app, "quit");
    assert!(app.should_quit);
  }

  #[tokio::test]
  async fn test_q_at_root_quits() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::demo(dir.path().to_path_buf()).await.unwrap();
    app.handle_key(key(KeyCode::Char('q')));
    assert!(app.should_quit);
  }
}
