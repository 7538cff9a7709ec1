//! Session controller: lifecycle state machine and loop supervision.
//!
//! All session state sits behind one mutex in [`SessionCore`]. Taps, the spawn
//! loop and the clock all mutate it through that lock, which is what makes the
//! spawn loop's compare-and-clear safe against a concurrent hit.
//!
//! ```text
//! Idle ──start──▶ Countdown ──ticks──▶ Active ──time up / end──▶ Ended
//!  ▲                  │                   │                        │
//!  └──────reset───────┴───────────────────┴──────────reset─────────┘
//!                                    Ended ──start──▶ Countdown
//! ```

use crate::clock;
use crate::config::SettingsHandle;
use crate::difficulty::{DifficultyModel, UnlockedLevels};
use crate::error::{GameError, Result};
use crate::observe::{Broadcaster, Subscription, SubscriptionId};
use crate::runtime::CancelToken;
use crate::score::{self, TapOutcome};
use crate::session::{Phase, SessionConfig, SessionState};
use crate::spawner;
use crate::stats::{PersistenceGateway, ScoreRecord};
use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Non-authoritative signals for audio/haptic collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Countdown(u32),
    Go,
    FinalCountdown(u32),
    Hit,
    Miss,
    LevelUp(u32),
    SessionOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum EndReason {
    TimeUp,
    Ended,
}

/// Loops belonging to one session.
struct RunHandle {
    session_id: u64,
    token: CancelToken,
    driver: JoinHandle<()>,
}

impl RunHandle {
    /// Cancel the loops and wait for them, unless called from the driver itself.
    fn stop(self) {
        self.token.cancel();
        if self.driver.thread().id() != thread::current().id() {
            let _ = self.driver.join();
        }
    }
}

pub(crate) struct SessionCore {
    pub(crate) config: SessionConfig,
    pub(crate) difficulty: DifficultyModel,
    pub(crate) cues: Broadcaster<Cue>,
    state: Mutex<SessionState>,
    snapshots: Broadcaster<SessionState>,
    gateway: Arc<dyn PersistenceGateway>,
    settings: SettingsHandle,
    run: Mutex<Option<RunHandle>>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
    next_session_id: AtomicU64,
}

impl SessionCore {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<RunHandle>> {
        self.run.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The single serialization point for state mutation. Subscribers see a
    /// snapshot whenever `f` changed something, in mutation order.
    pub(crate) fn update_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock_state();
        let before = state.clone();
        let result = f(&mut *state);
        if *state != before {
            self.snapshots.publish(&*state);
        }
        result
    }

    /// Like [`update_state`](Self::update_state), but only while session
    /// `session_id` is still active. Returns None once it is not.
    pub(crate) fn with_live_state<R>(
        &self,
        session_id: u64,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Option<R> {
        self.update_state(|state| state.is_live(session_id).then(|| f(state)))
    }

    fn take_run(&self, session_id: Option<u64>) -> Option<RunHandle> {
        let mut run = self.lock_run();
        match (run.as_ref(), session_id) {
            (Some(handle), Some(id)) if handle.session_id != id => None,
            _ => run.take(),
        }
    }

    /// End session `session_id` if it is still active.
    pub(crate) fn finish(&self, session_id: u64, reason: EndReason) -> bool {
        let final_state = self.update_state(|state| {
            if !state.is_live(session_id) {
                return None;
            }
            state.phase = Phase::Ended;
            state.active_target = None;
            state.final_countdown = false;
            Some(state.clone())
        });
        let Some(final_state) = final_state else {
            return false;
        };

        info!(
            session_id,
            %reason,
            score = final_state.score,
            hits = final_state.hits,
            misses = final_state.misses,
            "session ended"
        );
        self.cues.publish(&Cue::SessionOver);

        if let Some(run) = self.take_run(Some(session_id)) {
            run.stop();
        }
        self.persist(final_state);
        true
    }

    /// Hand the result to the gateway on a worker thread. Failures are logged.
    fn persist(&self, state: SessionState) {
        let player_name = self.settings.current().player_name;
        let record = ScoreRecord::from_session(&player_name, &state, Local::now());
        let gateway = Arc::clone(&self.gateway);

        let spawned = thread::Builder::new()
            .name("whack-persist".into())
            .spawn(move || {
                if let Err(e) = gateway.insert_score_record(&record) {
                    warn!(error = %e, player = %record.player_name, "failed to save score record");
                }
                if let Err(e) = gateway.upsert_player_aggregate(
                    &record.player_name,
                    record.score,
                    record.hits,
                    record.misses,
                ) {
                    warn!(error = %e, player = %record.player_name, "failed to update player stats");
                }
            });

        match spawned {
            Ok(handle) => {
                let mut pending = self.pending_writes.lock().unwrap_or_else(|p| p.into_inner());
                pending.retain(|h| !h.is_finished());
                pending.push(handle);
            }
            Err(e) => warn!(error = %e, "could not start persistence writer"),
        }
    }

    /// Countdown, then run the spawn loop and the clock until the session ends.
    fn drive(core: Arc<SessionCore>, session_id: u64, token: CancelToken) {
        for n in (1..=core.config.countdown_ticks).rev() {
            core.cues.publish(&Cue::Countdown(n));
            if !token.sleep(core.config.tick) {
                return;
            }
            let counting = core.update_state(|state| {
                if state.phase == Phase::Countdown && state.session_id == session_id {
                    state.countdown_remaining = n - 1;
                    true
                } else {
                    false
                }
            });
            if !counting {
                return;
            }
        }

        let activated = core.update_state(|state| {
            if state.phase == Phase::Countdown && state.session_id == session_id {
                state.phase = Phase::Active;
                true
            } else {
                false
            }
        });
        if !activated {
            return;
        }
        info!(session_id, "session active");
        core.cues.publish(&Cue::Go);

        let spawn_core = Arc::clone(&core);
        let spawn_token = token.clone();
        let spawn_loop = thread::Builder::new()
            .name("whack-spawner".into())
            .spawn(move || spawner::run(&spawn_core, session_id, &spawn_token));
        let spawn_loop = match spawn_loop {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start spawn loop");
                None
            }
        };

        clock::run(&core, session_id, &token);

        token.cancel();
        if let Some(handle) = spawn_loop {
            let _ = handle.join();
        }
    }
}

/// Public face of a play session. One session at a time per controller.
pub struct SessionController {
    core: Arc<SessionCore>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        difficulty: DifficultyModel,
        gateway: Arc<dyn PersistenceGateway>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            core: Arc::new(SessionCore {
                config,
                difficulty,
                cues: Broadcaster::new(),
                state: Mutex::new(SessionState::default()),
                snapshots: Broadcaster::new(),
                gateway,
                settings,
                run: Mutex::new(None),
                pending_writes: Mutex::new(Vec::new()),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn difficulty(&self) -> &DifficultyModel {
        &self.core.difficulty
    }

    pub fn snapshot(&self) -> SessionState {
        self.core.lock_state().clone()
    }

    pub fn subscribe_state(&self) -> Subscription<SessionState> {
        self.core.snapshots.subscribe()
    }

    pub fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        self.core.snapshots.unsubscribe(id)
    }

    pub fn subscribe_cues(&self) -> Subscription<Cue> {
        self.core.cues.subscribe()
    }

    pub fn unsubscribe_cues(&self, id: SubscriptionId) -> bool {
        self.core.cues.unsubscribe(id)
    }

    /// Start a new session at `level` from Idle or Ended.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidLevel`] if `level` is not in `unlocked`,
    /// [`GameError::AlreadyRunning`] if a session is counting down or active.
    pub fn start_session(&self, level: u32, unlocked: &UnlockedLevels) -> Result<()> {
        if !unlocked.contains(level) {
            warn!(level, unlocked = ?unlocked.levels(), "rejected start at locked level");
            return Err(GameError::InvalidLevel {
                level,
                unlocked: unlocked.levels().to_vec(),
            });
        }

        let session_id = self.core.next_session_id.fetch_add(1, Ordering::Relaxed);
        let config = &self.core.config;
        self.core.update_state(|state| {
            if matches!(state.phase, Phase::Countdown | Phase::Active) {
                return Err(GameError::AlreadyRunning);
            }
            *state = SessionState::starting(session_id, level, config);
            Ok(())
        })?;

        // loops of an earlier session may still be winding down
        if let Some(stale) = self.core.take_run(None) {
            stale.stop();
        }

        let token = CancelToken::new();
        let mut run = self.core.lock_run();
        let driver_core = Arc::clone(&self.core);
        let driver_token = token.clone();
        let driver = thread::Builder::new()
            .name("whack-session".into())
            .spawn(move || SessionCore::drive(driver_core, session_id, driver_token));

        match driver {
            Ok(driver) => {
                *run = Some(RunHandle {
                    session_id,
                    token,
                    driver,
                });
                info!(session_id, level, "session starting");
                Ok(())
            }
            Err(e) => {
                drop(run);
                self.core.update_state(|state| {
                    if state.session_id == session_id {
                        *state = SessionState::default();
                    }
                });
                Err(GameError::Io(e))
            }
        }
    }

    /// Resolve a tap on `index`. Outside an active session this does nothing
    /// and reports a miss.
    pub fn tap_hole(&self, index: usize) -> TapOutcome {
        let difficulty = &self.core.difficulty;
        let resolved = self.core.update_state(|state| {
            if state.phase != Phase::Active {
                return None;
            }
            let (next, outcome) = score::resolve_tap(state, index, difficulty);
            let leveled_up = next.level > state.level;
            *state = next;
            Some((outcome, leveled_up, state.level, state.session_id))
        });

        let Some((outcome, leveled_up, level, session_id)) = resolved else {
            debug!(index, "tap ignored outside active session");
            return TapOutcome::Miss;
        };

        debug!(session_id, index, ?outcome, "tap");
        self.core.cues.publish(&match outcome {
            TapOutcome::Hit => Cue::Hit,
            TapOutcome::Miss => Cue::Miss,
        });
        if leveled_up {
            info!(session_id, level, "level up");
            self.core.cues.publish(&Cue::LevelUp(level));
        }
        outcome
    }

    /// End the active session early. Returns false if no session is active;
    /// a countdown is left running, use [`reset_session`](Self::reset_session)
    /// to abandon it.
    pub fn end_session(&self) -> bool {
        let session_id = self.core.lock_state().session_id;
        self.core.finish(session_id, EndReason::Ended)
    }

    /// Stop any loops and go back to Idle. Persisted data is untouched.
    pub fn reset_session(&self) {
        let session_id = self.core.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.core.update_state(|state| {
            *state = SessionState {
                session_id,
                ..SessionState::default()
            };
        });
        if let Some(run) = self.core.take_run(None) {
            run.stop();
        }
        info!(session_id, "session reset");
    }

    /// Wait for session results handed to the gateway so far.
    pub fn flush_persistence(&self) {
        let handles: Vec<_> = self
            .core
            .pending_writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(run) = self.core.take_run(None) {
            run.token.cancel();
        }
    }
}
