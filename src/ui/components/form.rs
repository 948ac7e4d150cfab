use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Events emitted by a form that its owner needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  /// Enter pressed and every required field is filled
  Submitted,
  /// Escape pressed
  Cancelled,
}

/// One labelled text field.
#[derive(Debug, Clone)]
pub struct FormField {
  label: &'static str,
  input: TextInput,
  /// Message shown when the field is left empty; `None` for optional fields
  required: Option<&'static str>,
  hint: Option<&'static str>,
  error: Option<&'static str>,
}

impl FormField {
  pub fn optional(label: &'static str) -> Self {
    Self {
      label,
      input: TextInput::new(),
      required: None,
      hint: None,
      error: None,
    }
  }

  pub fn required(label: &'static str, message: &'static str) -> Self {
    Self {
      required: Some(message),
      ..Self::optional(label)
    }
  }

  /// Dimmed text shown next to the label
  pub fn hint(mut self, hint: &'static str) -> Self {
    self.hint = Some(hint);
    self
  }
}

/// A vertical stack of fields rendered as a centered overlay.
///
/// Tab/Shift-Tab (or Down/Up) move focus, Enter validates and submits, Esc
/// cancels. While a submission is pending only Esc is accepted.
#[derive(Debug, Clone)]
pub struct Form {
  title: String,
  fields: Vec<FormField>,
  focus: usize,
  alert: Option<String>,
  notice: Option<String>,
  pending: bool,
}

impl Form {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      fields: Vec::new(),
      focus: 0,
      alert: None,
      notice: None,
      pending: false,
    }
  }

  pub fn field(mut self, field: FormField) -> Self {
    self.fields.push(field);
    self
  }

  /// Trimmed value of field `index`, empty if there is no such field
  pub fn value(&self, index: usize) -> String {
    self
      .fields
      .get(index)
      .map(|f| f.input.value().trim().to_string())
      .unwrap_or_default()
  }

  /// Value of field `index`, or `None` when it was left empty
  pub fn non_empty(&self, index: usize) -> Option<String> {
    Some(self.value(index)).filter(|v| !v.is_empty())
  }

  pub fn set_value(&mut self, index: usize, value: &str) {
    if let Some(field) = self.fields.get_mut(index) {
      field.input.set_value(value);
    }
  }

  pub fn focus(&self) -> usize {
    self.focus
  }

  pub fn field_error(&self, index: usize) -> Option<&str> {
    self.fields.get(index).and_then(|f| f.error)
  }

  /// Form-level alert, e.g. a provider error from the last submission
  pub fn alert(&self) -> Option<&str> {
    self.alert.as_deref()
  }

  pub fn set_alert(&mut self, alert: Option<String>) {
    self.alert = alert;
  }

  /// Informational line shown instead of the fields, e.g. while loading
  pub fn set_notice(&mut self, notice: Option<String>) {
    self.notice = notice;
  }

  pub fn is_pending(&self) -> bool {
    self.pending
  }

  pub fn set_pending(&mut self, pending: bool) {
    self.pending = pending;
  }

  /// Mark every empty required field. Returns `true` when all are filled.
  pub fn validate(&mut self) -> bool {
    let mut valid = true;
    for field in &mut self.fields {
      field.error = match field.required {
        Some(message) if field.input.value().trim().is_empty() => {
          valid = false;
          Some(message)
        }
        _ => None,
      };
    }
    if let Some(first) = self.fields.iter().position(|f| f.error.is_some()) {
      self.focus = first;
    }
    valid
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if key.code == KeyCode::Esc {
      return KeyResult::Event(FormEvent::Cancelled);
    }
    if self.pending || self.notice.is_some() {
      return KeyResult::Handled;
    }

    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        if !self.fields.is_empty() {
          self.focus = (self.focus + 1) % self.fields.len();
        }
        KeyResult::Handled
      }
      KeyCode::BackTab | KeyCode::Up => {
        if !self.fields.is_empty() {
          self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
        KeyResult::Handled
      }
      KeyCode::Enter => {
        if self.validate() {
          KeyResult::Event(FormEvent::Submitted)
        } else {
          KeyResult::Handled
        }
      }
      _ => {
        let Some(field) = self.fields.get_mut(self.focus) else {
          return KeyResult::NotHandled;
        };
        match field.input.handle_key(key) {
          InputResult::Consumed => {
            field.error = None;
            KeyResult::Handled
          }
          InputResult::NotHandled => KeyResult::NotHandled,
          InputResult::Submitted(_) | InputResult::Cancelled => KeyResult::Handled,
        }
      }
    }
  }

  /// Render the form centered in `area`
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    if let Some(alert) = &self.alert {
      lines.push(Line::from(Span::styled(
        format!("! {}", alert),
        Style::default().fg(Color::Red).bold(),
      )));
      lines.push(Line::raw(""));
    }

    if let Some(notice) = &self.notice {
      lines.push(Line::from(Span::styled(
        notice.clone(),
        Style::default().fg(Color::DarkGray),
      )));
    } else {
      for (i, field) in self.fields.iter().enumerate() {
        let focused = i == self.focus && !self.pending;
        let label_style = if focused {
          Style::default().fg(Color::Cyan).bold()
        } else {
          Style::default().fg(Color::White)
        };
        let mut label = vec![Span::styled(field.label, label_style)];
        if field.required.is_some() {
          label.push(Span::styled(" *", Style::default().fg(Color::Yellow)));
        }
        if let Some(hint) = field.hint {
          label.push(Span::styled(
            format!("  {}", hint),
            Style::default().fg(Color::DarkGray),
          ));
        }
        lines.push(Line::from(label));

        let mut value = vec![Span::styled("> ", Style::default().fg(Color::DarkGray))];
        value.extend(field.input.spans(focused));
        lines.push(Line::from(value));

        if let Some(error) = field.error {
          lines.push(Line::from(Span::styled(
            format!("  {}", error),
            Style::default().fg(Color::Red),
          )));
        }
        lines.push(Line::raw(""));
      }
    }

    let footer = if self.pending {
      Span::styled("Saving...  <esc> cancel", Style::default().fg(Color::Yellow))
    } else {
      Span::styled(
        "<tab> next field  <enter> save  <esc> cancel",
        Style::default().fg(Color::DarkGray),
      )
    };
    lines.push(Line::from(footer));

    let width = (area.width * 60 / 100).clamp(30.min(area.width), 70.min(area.width));
    let height = (lines.len() as u16 + 2).min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));
    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, overlay_area);
  }
}
