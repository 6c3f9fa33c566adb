// SQLite persistence layer for players, valuations, calibration runs,
// parameter versions, and drift history.

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::calibration::CalibrationRun;
use crate::drift::{AlertKind, AlertSeverity, DriftAlert, DriftMetrics, ValuationSnapshot};
use crate::model::{PlayerRecord, PlayerStatus, Position, SettingsFingerprint};
use crate::store::ValuationStore;
use crate::valuation::{CalibrationParameters, ParameterVersion, Valuation};

/// SQLite-backed implementation of [`ValuationStore`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Key in `engine_state` holding the active parameter version.
    const ACTIVE_VERSION_KEY: &'static str = "active_parameter_version";

    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                position     TEXT NOT NULL,
                age          INTEGER,
                status       TEXT NOT NULL,
                market_value REAL,
                proj_now     REAL,
                proj_future  REAL,
                updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS valuations (
                player_id       TEXT NOT NULL REFERENCES players(id),
                fingerprint     TEXT NOT NULL,
                now_score       REAL NOT NULL,
                future_score    REAL NOT NULL,
                composite_value REAL NOT NULL,
                valuation       TEXT NOT NULL,
                computed_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (player_id, fingerprint)
            );

            CREATE TABLE IF NOT EXISTS parameter_versions (
                version     INTEGER PRIMARY KEY,
                run_id      TEXT,
                parameters  TEXT NOT NULL,
                promoted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS engine_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS calibration_runs (
                id         TEXT PRIMARY KEY,
                status     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                run        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS valuation_snapshots (
                id                TEXT PRIMARY KEY,
                taken_at          TEXT NOT NULL,
                parameter_version INTEGER NOT NULL,
                entries           TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS drift_metrics (
                id                TEXT PRIMARY KEY,
                snapshot_id       TEXT NOT NULL REFERENCES valuation_snapshots(id),
                prior_snapshot_id TEXT REFERENCES valuation_snapshots(id),
                computed_at       TEXT NOT NULL,
                overall_rho       REAL NOT NULL,
                divergence        REAL NOT NULL,
                mover_fraction    REAL NOT NULL,
                metrics           TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS drift_alerts (
                id          TEXT PRIMARY KEY,
                metrics_id  TEXT NOT NULL REFERENCES drift_metrics(id),
                created_at  TEXT NOT NULL,
                severity    TEXT NOT NULL,
                kind        TEXT NOT NULL,
                position    TEXT,
                value       REAL NOT NULL,
                threshold   REAL NOT NULL,
                message     TEXT NOT NULL,
                resolved    INTEGER NOT NULL DEFAULT 0,
                resolved_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_drift_alerts_resolved ON drift_alerts(resolved);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Parameter versions
    // ------------------------------------------------------------------

    /// All promoted versions, oldest first.
    pub fn parameter_history(&self) -> Result<Vec<ParameterVersion>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT version, run_id, parameters, promoted_at
                 FROM parameter_versions ORDER BY version",
            )
            .context("failed to prepare parameter_history query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("failed to query parameter versions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map parameter version rows")?;

        rows.into_iter()
            .map(|(version, run_id, parameters, promoted_at)| {
                decode_version(version, run_id, &parameters, &promoted_at)
            })
            .collect()
    }

    /// Point the active pointer at an earlier version (rollback).
    pub fn activate_version(&self, version: u64) -> Result<ParameterVersion> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let found = load_version(&tx, version)?
            .ok_or_else(|| anyhow!("parameter version {version} does not exist"))?;
        set_state(&tx, Self::ACTIVE_VERSION_KEY, &serde_json::json!(version))?;
        tx.commit().context("failed to commit version activation")?;
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Valuations
    // ------------------------------------------------------------------

    pub fn load_valuation(
        &self,
        player_id: &str,
        fingerprint: &SettingsFingerprint,
    ) -> Result<Option<Valuation>> {
        let conn = self.conn();
        let json: Option<String> = conn
            .query_row(
                "SELECT valuation FROM valuations WHERE player_id = ?1 AND fingerprint = ?2",
                params![player_id, fingerprint.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query valuation")?;
        json.map(|j| serde_json::from_str(&j).context("failed to deserialize valuation"))
            .transpose()
    }

    pub fn valuation_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM valuations", [], |row| row.get(0))
            .context("failed to count valuations")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Calibration runs
    // ------------------------------------------------------------------

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<CalibrationRun>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT run FROM calibration_runs ORDER BY rowid DESC LIMIT ?1")
            .context("failed to prepare list_runs query")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .context("failed to query calibration runs")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map calibration run rows")?;
        rows.iter()
            .map(|json| serde_json::from_str(json).context("failed to deserialize calibration run"))
            .collect()
    }

    // ------------------------------------------------------------------
    // Drift history
    // ------------------------------------------------------------------

    /// Most recent checks first.
    pub fn list_drift_metrics(&self, limit: usize) -> Result<Vec<DriftMetrics>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT metrics FROM drift_metrics ORDER BY rowid DESC LIMIT ?1")
            .context("failed to prepare list_drift_metrics query")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .context("failed to query drift metrics")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map drift metric rows")?;
        rows.iter()
            .map(|json| serde_json::from_str(json).context("failed to deserialize drift metrics"))
            .collect()
    }

    /// Alerts, newest first. Resolved alerts are included only when asked.
    pub fn list_alerts(&self, include_resolved: bool) -> Result<Vec<DriftAlert>> {
        let conn = self.conn();
        let sql = if include_resolved {
            "SELECT id, metrics_id, created_at, severity, kind, position, value, threshold,
                    message, resolved, resolved_at
             FROM drift_alerts ORDER BY rowid DESC"
        } else {
            "SELECT id, metrics_id, created_at, severity, kind, position, value, threshold,
                    message, resolved, resolved_at
             FROM drift_alerts WHERE resolved = 0 ORDER BY rowid DESC"
        };
        let mut stmt = conn.prepare(sql).context("failed to prepare list_alerts query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AlertRow {
                    id: row.get(0)?,
                    metrics_id: row.get(1)?,
                    created_at: row.get(2)?,
                    severity: row.get(3)?,
                    kind: row.get(4)?,
                    position: row.get(5)?,
                    value: row.get(6)?,
                    threshold: row.get(7)?,
                    message: row.get(8)?,
                    resolved: row.get(9)?,
                    resolved_at: row.get(10)?,
                })
            })
            .context("failed to query drift alerts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map drift alert rows")?;
        rows.into_iter().map(AlertRow::decode).collect()
    }

    /// Mark an alert resolved. Returns `false` if it does not exist or was
    /// already resolved.
    pub fn resolve_alert(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE drift_alerts SET resolved = 1, resolved_at = ?2
                 WHERE id = ?1 AND resolved = 0",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )
            .context("failed to resolve drift alert")?;
        Ok(changed == 1)
    }
}

// ---------------------------------------------------------------------------
// ValuationStore
// ---------------------------------------------------------------------------

impl ValuationStore for Database {
    fn load_players(&self) -> Result<Vec<PlayerRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, position, age, status, market_value, proj_now, proj_future
                 FROM players ORDER BY id",
            )
            .context("failed to prepare load_players query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, Option<f64>>(7)?,
                ))
            })
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;

        rows.into_iter()
            .map(
                |(id, name, position, age, status, market_value, proj_now, proj_future)| {
                    let position = Position::from_str_pos(&position)
                        .ok_or_else(|| anyhow!("player {id} has unknown position {position:?}"))?;
                    Ok(PlayerRecord {
                        id,
                        name,
                        position,
                        age,
                        status: PlayerStatus::from_str_status(&status),
                        market_value,
                        proj_now,
                        proj_future,
                    })
                },
            )
            .collect()
    }

    fn upsert_players(&self, players: &[PlayerRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin import transaction")?;
        for p in players {
            tx.execute(
                "INSERT INTO players (id, name, position, age, status, market_value, proj_now, proj_future)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name         = excluded.name,
                    position     = excluded.position,
                    age          = excluded.age,
                    status       = excluded.status,
                    market_value = excluded.market_value,
                    proj_now     = excluded.proj_now,
                    proj_future  = excluded.proj_future,
                    updated_at   = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    p.id,
                    p.name,
                    p.position.display_str(),
                    p.age,
                    p.status.display_str(),
                    p.market_value,
                    p.proj_now,
                    p.proj_future,
                ],
            )
            .with_context(|| format!("failed to upsert player {}", p.id))?;
        }
        tx.commit().context("failed to commit player import")?;
        Ok(players.len())
    }

    fn upsert_valuation(
        &self,
        player_id: &str,
        fingerprint: &SettingsFingerprint,
        valuation: &Valuation,
    ) -> Result<()> {
        let conn = self.conn();
        let json = serde_json::to_string(valuation).context("failed to serialize valuation")?;
        conn.execute(
            "INSERT INTO valuations (player_id, fingerprint, now_score, future_score, composite_value, valuation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(player_id, fingerprint) DO UPDATE SET
                now_score       = excluded.now_score,
                future_score    = excluded.future_score,
                composite_value = excluded.composite_value,
                valuation       = excluded.valuation,
                computed_at     = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![
                player_id,
                fingerprint.as_str(),
                valuation.now_score,
                valuation.future_score,
                valuation.composite_value,
                json,
            ],
        )
        .with_context(|| format!("failed to upsert valuation for {player_id}"))?;
        Ok(())
    }

    fn insert_run(&self, run: &CalibrationRun) -> Result<()> {
        let conn = self.conn();
        let json = serde_json::to_string(run).context("failed to serialize calibration run")?;
        conn.execute(
            "INSERT INTO calibration_runs (id, status, created_at, run) VALUES (?1, ?2, ?3, ?4)",
            params![
                run.id.to_string(),
                run.status.as_str(),
                run.created_at.to_rfc3339(),
                json
            ],
        )
        .context("failed to insert calibration run")?;
        Ok(())
    }

    fn update_run(&self, run: &CalibrationRun) -> Result<()> {
        let conn = self.conn();
        let json = serde_json::to_string(run).context("failed to serialize calibration run")?;
        let changed = conn
            .execute(
                "UPDATE calibration_runs SET status = ?2, run = ?3
                 WHERE id = ?1 AND status IN ('pending', 'running')",
                params![run.id.to_string(), run.status.as_str(), json],
            )
            .context("failed to update calibration run")?;
        if changed == 0 {
            bail!("calibration run {} is missing or already finished", run.id);
        }
        Ok(())
    }

    fn load_run(&self, id: Uuid) -> Result<Option<CalibrationRun>> {
        let conn = self.conn();
        let json: Option<String> = conn
            .query_row(
                "SELECT run FROM calibration_runs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query calibration run")?;
        json.map(|j| serde_json::from_str(&j).context("failed to deserialize calibration run"))
            .transpose()
    }

    fn active_parameters(&self) -> Result<Option<ParameterVersion>> {
        let conn = self.conn();
        let Some(value) = get_state(&conn, Self::ACTIVE_VERSION_KEY)? else {
            return Ok(None);
        };
        let version = value
            .as_u64()
            .ok_or_else(|| anyhow!("active parameter pointer is not a version number: {value}"))?;
        load_version(&conn, version)?
            .map(Some)
            .ok_or_else(|| anyhow!("active parameter version {version} is missing"))
    }

    fn promote_parameters(
        &self,
        run_id: Option<Uuid>,
        parameters: &CalibrationParameters,
    ) -> Result<ParameterVersion> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        let next: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM parameter_versions",
                [],
                |row| row.get(0),
            )
            .context("failed to allocate parameter version")?;
        let promoted = ParameterVersion {
            version: next as u64,
            run_id,
            parameters: parameters.clone(),
            promoted_at: Utc::now(),
        };
        let json = serde_json::to_string(parameters).context("failed to serialize parameters")?;
        tx.execute(
            "INSERT INTO parameter_versions (version, run_id, parameters, promoted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                next,
                run_id.map(|id| id.to_string()),
                json,
                promoted.promoted_at.to_rfc3339()
            ],
        )
        .context("failed to insert parameter version")?;
        set_state(&tx, Self::ACTIVE_VERSION_KEY, &serde_json::json!(next))?;

        tx.commit().context("failed to commit promotion")?;
        Ok(promoted)
    }

    fn latest_snapshot(&self) -> Result<Option<ValuationSnapshot>> {
        let conn = self.conn();
        let row: Option<(String, String, i64, String)> = conn
            .query_row(
                "SELECT id, taken_at, parameter_version, entries
                 FROM valuation_snapshots ORDER BY rowid DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .context("failed to query latest snapshot")?;
        let Some((id, taken_at, parameter_version, entries)) = row else {
            return Ok(None);
        };
        Ok(Some(ValuationSnapshot {
            id: parse_uuid(&id)?,
            taken_at: parse_time(&taken_at)?,
            parameter_version: parameter_version as u64,
            entries: serde_json::from_str(&entries)
                .context("failed to deserialize snapshot entries")?,
        }))
    }

    fn append_drift_check(
        &self,
        snapshot: &ValuationSnapshot,
        metrics: &DriftMetrics,
        alerts: &[DriftAlert],
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        let entries =
            serde_json::to_string(&snapshot.entries).context("failed to serialize snapshot")?;
        tx.execute(
            "INSERT INTO valuation_snapshots (id, taken_at, parameter_version, entries)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.id.to_string(),
                snapshot.taken_at.to_rfc3339(),
                snapshot.parameter_version as i64,
                entries
            ],
        )
        .context("failed to insert valuation snapshot")?;

        let metrics_json =
            serde_json::to_string(metrics).context("failed to serialize drift metrics")?;
        tx.execute(
            "INSERT INTO drift_metrics
                (id, snapshot_id, prior_snapshot_id, computed_at, overall_rho, divergence, mover_fraction, metrics)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                metrics.id.to_string(),
                metrics.snapshot_id.to_string(),
                metrics.prior_snapshot_id.map(|id| id.to_string()),
                metrics.computed_at.to_rfc3339(),
                metrics.overall_rho,
                metrics.divergence,
                metrics.mover_fraction,
                metrics_json
            ],
        )
        .context("failed to insert drift metrics")?;

        for alert in alerts {
            tx.execute(
                "INSERT INTO drift_alerts
                    (id, metrics_id, created_at, severity, kind, position, value, threshold, message, resolved, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    alert.id.to_string(),
                    alert.metrics_id.to_string(),
                    alert.created_at.to_rfc3339(),
                    alert.severity.as_str(),
                    alert.kind.as_str(),
                    alert.position.map(|p| p.display_str()),
                    alert.value,
                    alert.threshold,
                    alert.message,
                    alert.resolved,
                    alert.resolved_at.map(|t| t.to_rfc3339()),
                ],
            )
            .context("failed to insert drift alert")?;
        }

        tx.commit().context("failed to commit drift check")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn set_state(tx: &Transaction<'_>, key: &str, value: &serde_json::Value) -> Result<()> {
    let json_str = serde_json::to_string(value).context("failed to serialize state value")?;
    tx.execute(
        "INSERT OR REPLACE INTO engine_state (key, value) VALUES (?1, ?2)",
        params![key, json_str],
    )
    .context("failed to save engine state")?;
    Ok(())
}

fn get_state(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT value FROM engine_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query engine state")?;
    json.map(|j| serde_json::from_str(&j).context("failed to deserialize state value"))
        .transpose()
}

fn load_version(conn: &Connection, version: u64) -> Result<Option<ParameterVersion>> {
    let row: Option<(i64, Option<String>, String, String)> = conn
        .query_row(
            "SELECT version, run_id, parameters, promoted_at
             FROM parameter_versions WHERE version = ?1",
            params![version as i64],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .context("failed to query parameter version")?;
    row.map(|(version, run_id, parameters, promoted_at)| {
        decode_version(version, run_id, &parameters, &promoted_at)
    })
    .transpose()
}

fn decode_version(
    version: i64,
    run_id: Option<String>,
    parameters: &str,
    promoted_at: &str,
) -> Result<ParameterVersion> {
    Ok(ParameterVersion {
        version: version as u64,
        run_id: run_id.as_deref().map(parse_uuid).transpose()?,
        parameters: serde_json::from_str(parameters)
            .with_context(|| format!("failed to deserialize parameters of version {version}"))?,
        promoted_at: parse_time(promoted_at)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid id {s:?}"))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp {s:?}"))?
        .with_timezone(&Utc))
}

struct AlertRow {
    id: String,
    metrics_id: String,
    created_at: String,
    severity: String,
    kind: String,
    position: Option<String>,
    value: f64,
    threshold: f64,
    message: String,
    resolved: bool,
    resolved_at: Option<String>,
}

impl AlertRow {
    fn decode(self) -> Result<DriftAlert> {
        Ok(DriftAlert {
            id: parse_uuid(&self.id)?,
            metrics_id: parse_uuid(&self.metrics_id)?,
            created_at: parse_time(&self.created_at)?,
            severity: AlertSeverity::from_str_severity(&self.severity)
                .ok_or_else(|| anyhow!("unknown alert severity {:?}", self.severity))?,
            kind: AlertKind::from_str_kind(&self.kind)
                .ok_or_else(|| anyhow!("unknown alert kind {:?}", self.kind))?,
            position: self.position.as_deref().and_then(Position::from_str_pos),
            value: self.value,
            threshold: self.threshold,
            message: self.message,
            resolved: self.resolved,
            resolved_at: self.resolved_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
