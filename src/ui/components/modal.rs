//! Modal lifecycle shared by every create/edit form.
//!
//! ```text
//! Closed --Open--> Open --Submit--> Pending --Succeeded--> Closed
//!                   ^                  |
//!                   |               Failed(msg)
//!                   |                  v
//!                   +----Submit---- Failed(msg)
//! ```
//! `Cancel` closes the modal from any open state.

use super::form::{Form, FormEvent};
use super::KeyResult;
use crate::backend::DbResult;
use crate::query::Mutation;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModalState {
  #[default]
  Closed,
  /// Shown and editable
  Open,
  /// Submitted, waiting for the write to finish
  Pending,
  /// The last submission failed; the message is shown in the form
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalEvent {
  Open,
  Submit,
  Succeeded,
  Failed(String),
  Cancel,
}

impl ModalState {
  /// State after `event`. Events that make no sense in the current state are ignored.
  pub fn next(&self, event: ModalEvent) -> ModalState {
    use ModalEvent as E;
    use ModalState as S;
    match (self, event) {
      (S::Closed, E::Open) => S::Open,
      (S::Open | S::Failed(_), E::Submit) => S::Pending,
      (S::Pending, E::Succeeded) => S::Closed,
      (S::Pending, E::Failed(message)) => S::Failed(message),
      (S::Open | S::Pending | S::Failed(_), E::Cancel) => S::Closed,
      (state, _) => state.clone(),
    }
  }

  pub fn is_open(&self) -> bool {
    !matches!(self, ModalState::Closed)
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, ModalState::Pending)
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      ModalState::Failed(message) => Some(message),
      _ => None,
    }
  }
}

/// A form driven by [`ModalState`] whose submission runs as a background write.
pub struct ModalForm<T> {
  form: Form,
  state: ModalState,
  write: Option<Mutation<T>>,
}

impl<T: Send + 'static> ModalForm<T> {
  /// Open a modal around `form`.
  pub fn open(form: Form) -> Self {
    Self {
      form,
      state: ModalState::Closed.next(ModalEvent::Open),
      write: None,
    }
  }

  #[cfg(test)]
  pub fn state(&self) -> &ModalState {
    &self.state
  }

  pub fn is_open(&self) -> bool {
    self.state.is_open()
  }

  pub fn form(&self) -> &Form {
    &self.form
  }

  pub fn form_mut(&mut self) -> &mut Form {
    &mut self.form
  }

  /// Route a key to the form.
  ///
  /// Returns `Event(Submitted)` once the fields pass validation; the owner
  /// then builds the write and hands it to [`ModalForm::submit`].
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if !self.is_open() {
      return KeyResult::NotHandled;
    }
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Cancelled) => {
        self.dispatch(ModalEvent::Cancel);
        // a late result of the pending write is dropped with the receiver
        self.write = None;
        KeyResult::Event(FormEvent::Cancelled)
      }
      KeyResult::Event(FormEvent::Submitted) if self.state.is_pending() => KeyResult::Handled,
      other => other,
    }
  }

  /// Start the write for a validated submission.
  pub fn submit<Fut>(&mut self, write: Fut)
  where
    Fut: Future<Output = DbResult<T>> + Send + 'static,
  {
    if self.state.is_pending() {
      return;
    }
    self.dispatch(ModalEvent::Submit);
    self.write = Some(Mutation::spawn(write));
  }

  /// Poll the pending write. Returns the written value when it succeeded.
  pub fn tick(&mut self) -> Option<T> {
    let result = self.write.as_mut()?.poll()?;
    self.write = None;
    match result {
      Ok(value) => {
        self.dispatch(ModalEvent::Succeeded);
        Some(value)
      }
      Err(e) => {
        self.dispatch(ModalEvent::Failed(e.to_string()));
        None
      }
    }
  }

  fn dispatch(&mut self, event: ModalEvent) {
    let next = self.state.next(event);
    debug!(from = ?self.state, to = ?next, "Modal transition");
    self.form.set_pending(next.is_pending());
    self.form.set_alert(next.error().map(String::from));
    self.state = next;
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if self.is_open() {
      self.form.render_overlay(frame, area);
    }
  }
}
