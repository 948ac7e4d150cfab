use crate::query::Query;
use chrono::{DateTime, Utc};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Paragraph, Wrap};

/// Truncate a string to at most `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Short creation date for list rows
pub fn format_date(at: &DateTime<Utc>) -> String {
  at.format("%Y-%m-%d %H:%M").to_string()
}

/// Block title for a query-backed list, e.g. " Classes (3) "
pub fn list_title<T>(label: &str, query: &Query<Vec<T>>) -> String
where
  T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
{
  let len = query.data().map_or(0, Vec::len);
  if query.is_loading() {
    format!(" {} (loading...) ", label)
  } else if query.is_fetching() {
    format!(" {} ({}, refreshing...) ", label, len)
  } else {
    format!(" {} ({}) ", label, len)
  }
}

/// Render an error message inside `block`, e.g. a failed list load
pub fn draw_alert(frame: &mut Frame, area: Rect, block: Block, message: &str, hint: &str) {
  let lines = vec![
    Line::from(Span::styled(
      format!("! {}", message),
      Style::default().fg(Color::Red).bold(),
    )),
    Line::raw(""),
    Line::from(Span::styled(hint.to_string(), Style::default().fg(Color::DarkGray))),
  ];
  let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
  frame.render_widget(paragraph, area);
}

/// Render a dimmed placeholder inside `block`
pub fn draw_placeholder(frame: &mut Frame, area: Rect, block: Block, message: &str) {
  let paragraph = Paragraph::new(message.to_string())
    .block(block)
    .style(Style::default().fg(Color::DarkGray));
  frame.render_widget(paragraph, area);
}
