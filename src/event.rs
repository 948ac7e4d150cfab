use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal was resized; the next draw picks up the new size
  Resize,
  /// Periodic tick for query polling
  Tick,
}

/// Schedules ticks at a fixed rate, independent of how many input events arrive.
struct TickClock {
  rate: Duration,
  last: Instant,
}

impl TickClock {
  fn new(rate: Duration, now: Instant) -> Self {
    Self { rate, last: now }
  }

  /// How long input may be awaited before the next tick is due
  fn remaining(&self, now: Instant) -> Duration {
    self.rate.saturating_sub(now.saturating_duration_since(self.last))
  }

  /// Whether a tick is due at `now`; starts the next period if so
  fn due(&mut self, now: Instant) -> bool {
    if now.saturating_duration_since(self.last) >= self.rate {
      self.last = now;
      true
    } else {
      false
    }
  }
}

/// Produces events from terminal input and a tick timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm's poll blocks, so the reader gets its own thread
    tokio::task::spawn_blocking(move || {
      let mut clock = TickClock::new(tick_rate, Instant::now());
      loop {
        let input = match event::poll(clock.remaining(Instant::now())) {
          Ok(true) => match event::read() {
            Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
            Ok(CrosstermEvent::Resize(_, _)) => Some(Event::Resize),
            Ok(_) => None,
            Err(e) => {
              warn!(error = %e, "Failed to read terminal event");
              None
            }
          },
          Ok(false) => None,
          Err(e) => {
            warn!(error = %e, "Terminal event poll failed");
            break;
          }
        };

        if let Some(event) = input {
          if tx.send(event).is_err() {
            break;
          }
        }
        // mouse and focus events must not hold back query polling
        if clock.due(Instant::now()) && tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tick_is_due_after_rate_regardless_of_input() {
    let start = Instant::now();
    let rate = Duration::from_millis(100);
    let mut clock = TickClock::new(rate, start);

    // a stream of events every 10ms never resets the clock
    for step in 1..10 {
      assert!(!clock.due(start + Duration::from_millis(step * 10)));
    }
    assert!(clock.due(start + rate));
    assert!(!clock.due(start + rate + Duration::from_millis(10)));
    assert!(clock.due(start + rate * 2));
  }

  #[test]
  fn test_remaining_shrinks_toward_next_tick() {
    let start = Instant::now();
    let clock = TickClock::new(Duration::from_millis(100), start);
    assert_eq!(clock.remaining(start), Duration::from_millis(100));
    assert_eq!(
      clock.remaining(start + Duration::from_millis(40)),
      Duration::from_millis(60)
    );
    assert_eq!(clock.remaining(start + Duration::from_millis(250)), Duration::ZERO);
  }
}
