use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyModifiers};

/// Shared cancellation flag with an interruptible sleep.
///
/// Every scheduled wait in the session loops goes through [`CancelToken::sleep`],
/// so cancelling wakes all of them at once instead of after their timers run out.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Wait for `duration` or until cancelled. Returns true if the full delay
    /// elapsed and the caller should carry on.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|p| p.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|p| p.into_inner());
        !*guard
    }
}

/// Unified input event consumed by the play loop
#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    Tap(usize),
    Replay,
    Quit,
    Resize,
    Tick,
}

/// Map a digit key to a cell of a 3x3 grid laid out like a numeric keypad
/// (7 8 9 on the top row).
pub fn keypad_cell(c: char) -> Option<usize> {
    let digit = c.to_digit(10)?;
    if digit == 0 {
        return None;
    }
    let row_from_bottom = (digit - 1) / 3;
    let col = (digit - 1) % 3;
    Some(((2 - row_from_bottom) * 3 + col) as usize)
}

pub fn map_key(key: KeyEvent) -> Option<GameEvent> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(GameEvent::Quit)
        }
        KeyCode::Esc | KeyCode::Char('q') => Some(GameEvent::Quit),
        KeyCode::Char('r') => Some(GameEvent::Replay),
        KeyCode::Char(c) => keypad_cell(c).map(GameEvent::Tap),
        _ => None,
    }
}

/// Source of input events (keyboard, resize, etc.)
pub trait GameEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<GameEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let evt = match event::read() {
                Ok(CtEvent::Key(key)) => map_key(key),
                Ok(CtEvent::Resize(_, _)) => Some(GameEvent::Resize),
                Ok(_) => None,
                Err(_) => break,
            };
            if let Some(evt) = evt {
                if tx.send(evt).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<GameEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<GameEvent>) -> Self {
        Self { rx }
    }
}

impl GameEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the play loop one event/redraw tick at a time
pub struct Runner<E: GameEventSource> {
    event_source: E,
    interval: Duration,
}

impl<E: GameEventSource> Runner<E> {
    pub fn new(event_source: E, interval: Duration) -> Self {
        Self {
            event_source,
            interval,
        }
    }

    /// Blocks up to the redraw interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> GameEvent {
        match self.event_source.recv_timeout(self.interval) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => GameEvent::Tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleep_runs_full_duration_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn cancel_wakes_sleepers_early() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let completed = sleeper.sleep(Duration::from_secs(10));
            (completed, start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (completed, elapsed) = handle.join().unwrap();

        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }

    #[test]
    fn sleep_after_cancel_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        assert!(!token.sleep(Duration::from_secs(10)));
    }

    #[test]
    fn keypad_layout() {
        assert_eq!(keypad_cell('7'), Some(0));
        assert_eq!(keypad_cell('9'), Some(2));
        assert_eq!(keypad_cell('5'), Some(4));
        assert_eq!(keypad_cell('1'), Some(6));
        assert_eq!(keypad_cell('3'), Some(8));
        assert_eq!(keypad_cell('0'), None);
        assert_eq!(keypad_cell('x'), None);
    }

    #[test]
    fn keys_map_to_events() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(map_key(key(KeyCode::Char('8'))), Some(GameEvent::Tap(1)));
        assert_eq!(map_key(key(KeyCode::Esc)), Some(GameEvent::Quit));
        assert_eq!(map_key(key(KeyCode::Char('r'))), Some(GameEvent::Replay));
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(GameEvent::Quit)
        );
        assert_eq!(map_key(key(KeyCode::Left)), None);
    }

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), Duration::from_millis(1));

        assert_eq!(runner.step(), GameEvent::Tick);
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(GameEvent::Tap(3)).unwrap();
        let runner = Runner::new(TestEventSource::new(rx), Duration::from_millis(10));

        assert_eq!(runner.step(), GameEvent::Tap(3));
    }
}
