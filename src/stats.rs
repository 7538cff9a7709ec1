use crate::difficulty::DifficultyLabel;
use crate::error::Result;
use crate::session::SessionState;
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Final result of one session. Written once, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub id: Option<i64>,
    pub player_name: String,
    pub score: u64,
    pub highest_level: u32,
    pub difficulty: String,
    pub hits: u32,
    pub misses: u32,
    pub created_at: DateTime<Local>,
}

impl ScoreRecord {
    pub fn from_session(
        player_name: &str,
        state: &SessionState,
        created_at: DateTime<Local>,
    ) -> Self {
        Self {
            id: None,
            player_name: player_name.to_string(),
            score: state.score,
            highest_level: state.highest_level_reached,
            difficulty: DifficultyLabel::for_level(state.highest_level_reached).to_string(),
            hits: state.hits,
            misses: state.misses,
            created_at,
        }
    }
}

/// Lifetime totals for one player name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAggregate {
    pub player_name: String,
    pub games_played: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub best_score: u64,
}

impl PlayerAggregate {
    /// Hit percentage over all taps, or None before any tap.
    pub fn accuracy(&self) -> Option<f64> {
        let taps = self.total_hits + self.total_misses;
        (taps > 0).then(|| self.total_hits as f64 * 100.0 / taps as f64)
    }
}

/// Storage contract consumed by the session controller and the CLI.
pub trait PersistenceGateway: Send + Sync {
    fn insert_score_record(&self, record: &ScoreRecord) -> Result<()>;

    /// Create the player's row, or count one more game and fold the deltas in.
    /// `best_score` only ever rises.
    fn upsert_player_aggregate(
        &self,
        player_name: &str,
        score: u64,
        hits: u32,
        misses: u32,
    ) -> Result<()>;

    /// Highest scores first; ties go to the most recent record.
    fn query_top_scores(&self, n: usize) -> Result<Vec<ScoreRecord>>;

    fn player_aggregate(&self, player_name: &str) -> Result<Option<PlayerAggregate>>;

    fn delete_all_scores(&self) -> Result<()>;

    fn delete_all_players(&self) -> Result<()>;

    fn best_score(&self, player_name: &str) -> Result<u64> {
        Ok(self
            .player_aggregate(player_name)?
            .map_or(0, |aggregate| aggregate.best_score))
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_name TEXT NOT NULL,
    score INTEGER NOT NULL,
    highest_level INTEGER NOT NULL,
    difficulty TEXT NOT NULL,
    hits INTEGER NOT NULL,
    misses INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scores_score ON scores(score DESC, created_at DESC);
CREATE TABLE IF NOT EXISTS players (
    player_name TEXT PRIMARY KEY,
    games_played INTEGER NOT NULL,
    total_hits INTEGER NOT NULL,
    total_misses INTEGER NOT NULL,
    best_score INTEGER NOT NULL
);
"#;

/// SQLite-backed [`PersistenceGateway`].
#[derive(Debug)]
pub struct SqliteScoreStore {
    conn: Mutex<Connection>,
}

impl SqliteScoreStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "opening score database");
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ScoreRecord> {
        let created_at: String = row.get(7)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    7,
                    "created_at".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?
            .with_timezone(&Local);

        Ok(ScoreRecord {
            id: Some(row.get(0)?),
            player_name: row.get(1)?,
            score: row.get::<_, i64>(2)? as u64,
            highest_level: row.get(3)?,
            difficulty: row.get(4)?,
            hits: row.get(5)?,
            misses: row.get(6)?,
            created_at,
        })
    }
}

impl PersistenceGateway for SqliteScoreStore {
    fn insert_score_record(&self, record: &ScoreRecord) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO scores
            (player_name, score, highest_level, difficulty, hits, misses, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.player_name,
                record.score as i64,
                record.highest_level,
                record.difficulty,
                record.hits,
                record.misses,
                record.created_at.to_rfc3339(),
            ],
        )?;
        debug!(player = %record.player_name, score = record.score, "score recorded");
        Ok(())
    }

    fn upsert_player_aggregate(
        &self,
        player_name: &str,
        score: u64,
        hits: u32,
        misses: u32,
    ) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO players (player_name, games_played, total_hits, total_misses, best_score)
            VALUES (?1, 1, ?2, ?3, ?4)
            ON CONFLICT(player_name) DO UPDATE SET
                games_played = games_played + 1,
                total_hits = total_hits + excluded.total_hits,
                total_misses = total_misses + excluded.total_misses,
                best_score = MAX(best_score, excluded.best_score)
            "#,
            params![player_name, hits, misses, score as i64],
        )?;
        debug!(player = %player_name, "player aggregate updated");
        Ok(())
    }

    fn query_top_scores(&self, n: usize) -> Result<Vec<ScoreRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, player_name, score, highest_level, difficulty, hits, misses, created_at
            FROM scores
            ORDER BY score DESC, created_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([n as i64], Self::record_from_row)?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    fn player_aggregate(&self, player_name: &str) -> Result<Option<PlayerAggregate>> {
        let aggregate = self
            .conn()
            .query_row(
                r#"
                SELECT player_name, games_played, total_hits, total_misses, best_score
                FROM players WHERE player_name = ?1
                "#,
                [player_name],
                |row| {
                    Ok(PlayerAggregate {
                        player_name: row.get(0)?,
                        games_played: row.get::<_, i64>(1)? as u64,
                        total_hits: row.get::<_, i64>(2)? as u64,
                        total_misses: row.get::<_, i64>(3)? as u64,
                        best_score: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(aggregate)
    }

    fn delete_all_scores(&self) -> Result<()> {
        self.conn().execute("DELETE FROM scores", [])?;
        info!("all scores deleted");
        Ok(())
    }

    fn delete_all_players(&self) -> Result<()> {
        self.conn().execute("DELETE FROM players", [])?;
        info!("all players deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn record(player: &str, score: u64, created_at: DateTime<Local>) -> ScoreRecord {
        ScoreRecord {
            id: None,
            player_name: player.to_string(),
            score,
            highest_level: 2,
            difficulty: "Easy".to_string(),
            hits: 6,
            misses: 1,
            created_at,
        }
    }

    fn base_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn record_from_session_uses_highest_level_label() {
        let state = SessionState {
            score: 420,
            hits: 30,
            misses: 4,
            level: 6,
            highest_level_reached: 6,
            ..SessionState::default()
        };
        let r = ScoreRecord::from_session("Ada", &state, base_time());
        assert_eq!(r.difficulty, "Hard");
        assert_eq!(r.highest_level, 6);
        assert_eq!(r.score, 420);
        assert_eq!(r.id, None);
    }

    #[test]
    fn insert_and_query_roundtrip() {
        let store = SqliteScoreStore::in_memory().unwrap();
        let r = record("Ada", 120, base_time());
        store.insert_score_record(&r).unwrap();

        let top = store.query_top_scores(10).unwrap();
        assert_eq!(top.len(), 1);
        assert!(top[0].id.is_some());
        assert_eq!(top[0].player_name, "Ada");
        assert_eq!(top[0].score, 120);
        assert_eq!(top[0].created_at, r.created_at);
    }

    #[test]
    fn top_scores_order_by_score_then_recency() {
        let store = SqliteScoreStore::in_memory().unwrap();
        let t = base_time();
        store.insert_score_record(&record("old", 100, t)).unwrap();
        store
            .insert_score_record(&record("new", 100, t + Duration::minutes(5)))
            .unwrap();
        store.insert_score_record(&record("top", 300, t)).unwrap();
        store.insert_score_record(&record("low", 10, t)).unwrap();

        let names: Vec<_> = store
            .query_top_scores(3)
            .unwrap()
            .into_iter()
            .map(|r| r.player_name)
            .collect();
        assert_eq!(names, vec!["top", "new", "old"]);
    }

    #[test]
    fn upsert_creates_then_merges() {
        let store = SqliteScoreStore::in_memory().unwrap();
        store.upsert_player_aggregate("Ada", 200, 10, 2).unwrap();
        store.upsert_player_aggregate("Ada", 150, 7, 5).unwrap();

        let agg = store.player_aggregate("Ada").unwrap().unwrap();
        assert_eq!(agg.games_played, 2);
        assert_eq!(agg.total_hits, 17);
        assert_eq!(agg.total_misses, 7);
        assert_eq!(agg.best_score, 200);

        store.upsert_player_aggregate("Ada", 900, 0, 0).unwrap();
        assert_eq!(store.best_score("Ada").unwrap(), 900);
    }

    #[test]
    fn unknown_player_has_no_aggregate() {
        let store = SqliteScoreStore::in_memory().unwrap();
        assert_eq!(store.player_aggregate("nobody").unwrap(), None);
        assert_eq!(store.best_score("nobody").unwrap(), 0);
    }

    #[test]
    fn delete_all_wipes_tables_independently() {
        let store = SqliteScoreStore::in_memory().unwrap();
        store.insert_score_record(&record("Ada", 1, base_time())).unwrap();
        store.upsert_player_aggregate("Ada", 1, 1, 0).unwrap();

        store.delete_all_scores().unwrap();
        assert!(store.query_top_scores(10).unwrap().is_empty());
        assert!(store.player_aggregate("Ada").unwrap().is_some());

        store.delete_all_players().unwrap();
        assert!(store.player_aggregate("Ada").unwrap().is_none());
    }

    #[test]
    fn file_database_persists_between_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.db");
        {
            let store = SqliteScoreStore::open(&path).unwrap();
            store.insert_score_record(&record("Ada", 77, base_time())).unwrap();
        }
        let reopened = SqliteScoreStore::open(&path).unwrap();
        assert_eq!(reopened.query_top_scores(1).unwrap()[0].score, 77);
    }

    #[test]
    fn accuracy_over_all_taps() {
        let agg = PlayerAggregate {
            player_name: "Ada".into(),
            games_played: 1,
            total_hits: 3,
            total_misses: 1,
            best_score: 10,
        };
        assert_eq!(agg.accuracy(), Some(75.0));
        let empty = PlayerAggregate {
            total_hits: 0,
            total_misses: 0,
            ..agg
        };
        assert_eq!(empty.accuracy(), None);
    }
}
