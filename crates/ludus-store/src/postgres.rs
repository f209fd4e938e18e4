//! Postgres-backed game store.
//!
//! This module is feature-gated behind `store-postgres`. Lease rotation is a
//! single conditional `UPDATE ... RETURNING`; frame appends and status changes
//! take a row lock on the game so they serialize per id.

#![cfg(feature = "store-postgres")]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ludus_kernel::{Frame, Game, GameId, GameStatus, LeaseToken, LudusError};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;

use crate::lease::LeaseConfig;
use crate::store::{check_transition, frame_window, validate_seed_frames, GameStore};

fn is_valid_schema_ident(schema: &str) -> bool {
    !schema.is_empty()
        && schema
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn map_driver_err(prefix: &str, e: impl std::fmt::Display) -> LudusError {
    LudusError::Driver(format!("{prefix}: {e}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn dt_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn ms_to_dt(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
}

fn parse_status(value: &str) -> Result<GameStatus, LudusError> {
    GameStatus::parse(value).ok_or_else(|| map_driver_err("unknown game status", value))
}

#[derive(Clone)]
pub struct PostgresGameStore {
    pool: PgPool,
    schema: String,
    config: LeaseConfig,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresGameStore {
    /// Lazily connecting store; no connection is made until first use.
    pub fn new(database_url: &str) -> Result<Self, LudusError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| map_driver_err("postgres init error", e))?;
        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema: "public".to_string(),
            config: LeaseConfig::default(),
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self.schema_ready = Arc::new(OnceCell::new());
        self
    }

    pub fn with_lease_config(mut self, config: LeaseConfig) -> Self {
        self.config = config;
        self
    }

    fn games_table(&self) -> String {
        format!("\"{}\".ludus_games", self.schema)
    }

    fn frames_table(&self) -> String {
        format!("\"{}\".ludus_frames", self.schema)
    }

    fn lease_ttl_ms(&self) -> i64 {
        i64::try_from(self.config.lease_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    async fn ensure_schema(&self) -> Result<(), LudusError> {
        if !is_valid_schema_ident(&self.schema) {
            return Err(map_driver_err("invalid schema", &self.schema));
        }

        self.schema_ready
            .get_or_try_init(|| async {
                let games = self.games_table();
                let frames = self.frames_table();
                let statements = [
                    format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.schema),
                    format!(
                        "CREATE TABLE IF NOT EXISTS {games} (
                            id TEXT PRIMARY KEY,
                            seq BIGSERIAL,
                            mode TEXT NOT NULL,
                            width BIGINT NOT NULL,
                            height BIGINT NOT NULL,
                            participants JSONB NOT NULL,
                            status TEXT NOT NULL,
                            created_at_ms BIGINT NOT NULL,
                            lease_token TEXT NULL,
                            lease_expires_at_ms BIGINT NULL
                        )"
                    ),
                    format!(
                        "CREATE TABLE IF NOT EXISTS {frames} (
                            game_id TEXT NOT NULL REFERENCES {games}(id),
                            turn BIGINT NOT NULL,
                            payload JSONB NOT NULL,
                            PRIMARY KEY (game_id, turn)
                        )"
                    ),
                    format!(
                        "CREATE INDEX IF NOT EXISTS idx_ludus_games_queue
                         ON {games}(status, lease_expires_at_ms)"
                    ),
                ];
                for sql in &statements {
                    sqlx::query(sql)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| map_driver_err("schema bootstrap", e))?;
                }
                Ok::<(), LudusError>(())
            })
            .await?;
        Ok(())
    }

    async fn game_exists(&self, id: &GameId) -> Result<bool, LudusError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = $1", self.games_table());
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_driver_err("check game", e))?;
        Ok(row.is_some())
    }

    /// Conflict when the game exists, not-found otherwise.
    async fn conflict_or_missing(&self, id: &GameId) -> LudusError {
        match self.game_exists(id).await {
            Ok(true) => LudusError::LockConflict(id.clone()),
            Ok(false) => LudusError::GameNotFound(id.clone()),
            Err(e) => e,
        }
    }

    fn game_from_row(row: &PgRow) -> Result<Game, LudusError> {
        let get_err = |e| map_driver_err("decode game row", e);
        let participants: Json<Vec<String>> = row.try_get("participants").map_err(get_err)?;
        let status: String = row.try_get("status").map_err(get_err)?;
        let width: i64 = row.try_get("width").map_err(get_err)?;
        let height: i64 = row.try_get("height").map_err(get_err)?;
        Ok(Game {
            id: GameId::new(row.try_get::<String, _>("id").map_err(get_err)?),
            mode: row.try_get("mode").map_err(get_err)?,
            width: u32::try_from(width).map_err(|e| map_driver_err("decode width", e))?,
            height: u32::try_from(height).map_err(|e| map_driver_err("decode height", e))?,
            participants: participants.0,
            status: parse_status(&status)?,
            created_at: ms_to_dt(row.try_get("created_at_ms").map_err(get_err)?),
        })
    }
}

#[async_trait]
impl GameStore for PostgresGameStore {
    async fn pop_game_id(&self) -> Result<GameId, LudusError> {
        self.ensure_schema().await?;
        let sql = format!(
            "SELECT id FROM {}
             WHERE status <> 'complete'
               AND (lease_token IS NULL OR lease_expires_at_ms <= $1)
             ORDER BY seq ASC
             LIMIT 1",
            self.games_table()
        );
        let row = sqlx::query(&sql)
            .bind(dt_to_ms(Utc::now()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_driver_err("pop game id", e))?;
        match row {
            Some(row) => Ok(GameId::new(
                row.try_get::<String, _>(0)
                    .map_err(|e| map_driver_err("decode game id", e))?,
            )),
            None => Err(LudusError::QueueEmpty),
        }
    }

    async fn lock(
        &self,
        id: &GameId,
        previous: Option<&LeaseToken>,
    ) -> Result<LeaseToken, LudusError> {
        self.ensure_schema().await?;
        let now_ms = dt_to_ms(Utc::now());
        let token = LeaseToken::generate();
        let sql = format!(
            "UPDATE {}
             SET lease_token = $3, lease_expires_at_ms = $4
             WHERE id = $1
               AND (
                 ($2::TEXT IS NOT NULL AND lease_token = $2)
                 OR ($2::TEXT IS NULL AND (lease_token IS NULL OR lease_expires_at_ms <= $5))
               )
             RETURNING id",
            self.games_table()
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(previous.map(LeaseToken::as_str))
            .bind(token.as_str())
            .bind(now_ms.saturating_add(self.lease_ttl_ms()))
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_driver_err("rotate lease", e))?;
        match row {
            Some(_) => Ok(token),
            None => Err(self.conflict_or_missing(id).await),
        }
    }

    async fn unlock(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError> {
        self.ensure_schema().await?;
        let sql = format!(
            "UPDATE {}
             SET lease_token = NULL, lease_expires_at_ms = NULL
             WHERE id = $1 AND lease_token = $2",
            self.games_table()
        );
        let updated = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(token.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_driver_err("release lease", e))?
            .rows_affected();
        if updated == 0 {
            return Err(self.conflict_or_missing(id).await);
        }
        Ok(())
    }

    async fn create_game(&self, game: Game, frames: Vec<Frame>) -> Result<(), LudusError> {
        validate_seed_frames(&frames)?;
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_driver_err("begin create game tx", e))?;

        let insert_game = format!(
            "INSERT INTO {} (id, mode, width, height, participants, status, created_at_ms)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.games_table()
        );
        let inserted = sqlx::query(&insert_game)
            .bind(game.id.as_str())
            .bind(&game.mode)
            .bind(i64::from(game.width))
            .bind(i64::from(game.height))
            .bind(Json(&game.participants))
            .bind(game.status.as_str())
            .bind(dt_to_ms(game.created_at))
            .execute(&mut *tx)
            .await;
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(LudusError::InvalidArgument(format!(
                    "game {} already exists",
                    game.id
                )));
            }
            return Err(map_driver_err("insert game", e));
        }

        let insert_frame = format!(
            "INSERT INTO {} (game_id, turn, payload) VALUES ($1, $2, $3)",
            self.frames_table()
        );
        for frame in &frames {
            sqlx::query(&insert_frame)
                .bind(game.id.as_str())
                .bind(i64::from(frame.turn))
                .bind(Json(frame))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_driver_err("insert seed frame", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_driver_err("commit create game tx", e))
    }

    async fn get_game(&self, id: &GameId) -> Result<Game, LudusError> {
        self.ensure_schema().await?;
        let sql = format!(
            "SELECT id, mode, width, height, participants, status, created_at_ms
             FROM {} WHERE id = $1",
            self.games_table()
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_driver_err("get game", e))?
            .ok_or_else(|| LudusError::GameNotFound(id.clone()))?;
        Self::game_from_row(&row)
    }

    async fn set_game_status(&self, id: &GameId, status: GameStatus) -> Result<(), LudusError> {
        self.ensure_schema().await?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_driver_err("begin status tx", e))?;

        let select = format!(
            "SELECT status FROM {} WHERE id = $1 FOR UPDATE",
            self.games_table()
        );
        let current: String = sqlx::query_scalar(&select)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_driver_err("read status", e))?
            .ok_or_else(|| LudusError::GameNotFound(id.clone()))?;
        check_transition(parse_status(&current)?, status)?;

        let update = format!("UPDATE {} SET status = $2 WHERE id = $1", self.games_table());
        sqlx::query(&update)
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_driver_err("update status", e))?;

        tx.commit()
            .await
            .map_err(|e| map_driver_err("commit status tx", e))
    }

    async fn push_game_frame(&self, id: &GameId, frame: Frame) -> Result<(), LudusError> {
        self.ensure_schema().await?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_driver_err("begin push frame tx", e))?;

        let lock_game = format!("SELECT 1 FROM {} WHERE id = $1 FOR UPDATE", self.games_table());
        sqlx::query(&lock_game)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_driver_err("lock game row", e))?
            .ok_or_else(|| LudusError::GameNotFound(id.clone()))?;

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE game_id = $1", self.frames_table());
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_driver_err("count frames", e))?;
        let expected = u32::try_from(count).map_err(|e| map_driver_err("frame count", e))?;
        if frame.turn != expected {
            return Err(LudusError::FrameOutOfOrder {
                expected,
                got: frame.turn,
            });
        }

        let insert = format!(
            "INSERT INTO {} (game_id, turn, payload) VALUES ($1, $2, $3)",
            self.frames_table()
        );
        sqlx::query(&insert)
            .bind(id.as_str())
            .bind(i64::from(frame.turn))
            .bind(Json(&frame))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_driver_err("insert frame", e))?;

        tx.commit()
            .await
            .map_err(|e| map_driver_err("commit push frame tx", e))
    }

    async fn list_game_frames(
        &self,
        id: &GameId,
        limit: usize,
        offset: i64,
    ) -> Result<Vec<Frame>, LudusError> {
        self.ensure_schema().await?;
        if !self.game_exists(id).await? {
            return Err(LudusError::GameNotFound(id.clone()));
        }

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE game_id = $1", self.frames_table());
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_driver_err("count frames", e))?;
        let len = usize::try_from(count).map_err(|e| map_driver_err("frame count", e))?;
        let window = frame_window(len, limit, offset);
        if window.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT payload FROM {}
             WHERE game_id = $1 AND turn >= $2
             ORDER BY turn ASC
             LIMIT $3",
            self.frames_table()
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(window.start as i64)
            .bind(window.len() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_driver_err("list frames", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Json<Frame>, _>(0)
                    .map(|payload| payload.0)
                    .map_err(|e| map_driver_err("decode frame", e))
            })
            .collect()
    }
}
