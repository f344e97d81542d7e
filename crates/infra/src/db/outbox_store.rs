//! SQLite-backed [`OutboxStore`] (C2).
//!
//! Grounded on `SqlCipherOutboxRepository`/`outbox_repository.rs`: plain
//! SQL constants, a `map_storage_error`/`map_join_error` pair at every
//! adapter boundary, and every blocking rusqlite call wrapped in
//! `task::spawn_blocking` so the tokio executor never blocks on disk I/O.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relaybox_common::now_ms;
use relaybox_domain::{
    NewOutboxRecord, OutboxQuery, OutboxRecord, OutboxStatus, RelayError, Result,
    SendOutcomeUpdate, ShardTarget,
};
use relaybox_core::ports::OutboxStore;
use rusqlite::{params, params_from_iter};

use crate::db::manager::DbManager;

const INSERT_SQL: &str =
    "INSERT INTO local_msgs (msg_key, data, send_times, status, utime, ctime) VALUES (?1, ?2, 0, 0, ?3, ?3)";
const SELECT_BY_ID_SQL: &str =
    "SELECT id, msg_key, data, send_times, status, utime, ctime FROM local_msgs WHERE id = ?1";
const FIND_STUCK_SQL: &str =
    "SELECT id, msg_key, data, send_times, status, utime, ctime FROM local_msgs \
     WHERE status = 0 AND utime < ?1 ORDER BY utime ASC LIMIT ?2";
const UPDATE_ON_SEND_SQL: &str =
    "UPDATE local_msgs SET status = ?1, send_times = ?2, utime = ?3 WHERE id = ?4";

fn map_storage_error(e: rusqlite::Error) -> RelayError {
    RelayError::Database(e.to_string())
}

fn map_join_error(e: tokio::task::JoinError) -> RelayError {
    RelayError::Internal(format!("blocking task panicked: {e}"))
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxRecord> {
    let status_code: i32 = row.get(4)?;
    let status = OutboxStatus::from_code(status_code).unwrap_or_else(|| {
        tracing::warn!(status_code, "unknown outbox status code, defaulting to Init");
        OutboxStatus::Init
    });
    Ok(OutboxRecord {
        id: row.get(0)?,
        key: row.get(1)?,
        data: row.get(2)?,
        send_times: row.get(3)?,
        status,
        utime: row.get(5)?,
        ctime: row.get(6)?,
    })
}

fn table_name(target: &ShardTarget) -> String {
    if target.table.is_empty() {
        "local_msgs".to_string()
    } else {
        target.table.clone()
    }
}

/// Rewrites a SQL template's hardcoded `local_msgs` table name to the
/// target's table, since sqlite doesn't support parameterized identifiers.
fn qualify(sql: &str, table: &str) -> String {
    sql.replacen("local_msgs", table, 1)
}

pub struct SqliteOutboxStore {
    db: Arc<DbManager>,
}

impl SqliteOutboxStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert through a transaction the caller already holds, so the row
    /// lands atomically with their business write. Used
    /// by the transactional facade's `ExecTx`/`SaveMsg`, not by the trait
    /// method above.
    pub fn insert_in_tx(
        tx: &rusqlite::Transaction<'_>,
        target: &ShardTarget,
        record: &NewOutboxRecord,
    ) -> Result<i64> {
        let now = now_ms();
        let sql = qualify(INSERT_SQL, &table_name(target));
        tx.execute(&sql, params![record.key, record.data, now]).map_err(map_storage_error)?;
        Ok(tx.last_insert_rowid())
    }
}

#[async_trait]
impl OutboxStore for SqliteOutboxStore {
    async fn insert(&self, target: &ShardTarget, record: NewOutboxRecord) -> Result<i64> {
        let target = target.clone();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let now = now_ms();
            let sql = qualify(INSERT_SQL, &table_name(&target));
            conn.execute(&sql, params![record.key, record.data, now]).map_err(map_storage_error)?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get(&self, target: &ShardTarget, id: i64) -> Result<Option<OutboxRecord>> {
        let target = target.clone();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let sql = qualify(SELECT_BY_ID_SQL, &table_name(&target));
            let mut stmt = conn.prepare(&sql).map_err(map_storage_error)?;
            let mut rows = stmt.query(params![id]).map_err(map_storage_error)?;
            match rows.next().map_err(map_storage_error)? {
                Some(row) => Ok(Some(map_row(row).map_err(map_storage_error)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list(&self, target: &ShardTarget, query: &OutboxQuery) -> Result<Vec<OutboxRecord>> {
        let target = target.clone();
        let query = query.clone_owned();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let table = table_name(&target);
            let mut sql = format!(
                "SELECT id, msg_key, data, send_times, status, utime, ctime FROM {table} WHERE 1=1"
            );
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(status) = query.status {
                sql.push_str(" AND status = ?");
                args.push(Box::new(status.code()));
            }
            if let Some(key) = &query.key {
                sql.push_str(" AND msg_key = ?");
                args.push(Box::new(key.clone()));
            }
            if let Some(from) = query.ctime_from {
                sql.push_str(" AND ctime >= ?");
                args.push(Box::new(from));
            }
            if let Some(to) = query.ctime_to {
                sql.push_str(" AND ctime <= ?");
                args.push(Box::new(to));
            }
            sql.push_str(" ORDER BY ctime ASC LIMIT ? OFFSET ?");
            args.push(Box::new(query.limit as i64));
            args.push(Box::new(query.offset as i64));

            let mut stmt = conn.prepare(&sql).map_err(map_storage_error)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter().map(|a| a.as_ref())), map_row)
                .map_err(map_storage_error)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(map_storage_error)?);
            }
            Ok(out)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_stuck(
        &self,
        target: &ShardTarget,
        wait_duration: Duration,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>> {
        let target = target.clone();
        let db = self.db.clone();
        let cutoff = now_ms() - wait_duration.as_millis() as i64;
        tokio::task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let sql = qualify(FIND_STUCK_SQL, &table_name(&target));
            let mut stmt = conn.prepare(&sql).map_err(map_storage_error)?;
            let rows = stmt
                .query_map(params![cutoff, limit as i64], map_row)
                .map_err(map_storage_error)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(map_storage_error)?);
            }
            Ok(out)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update_on_send(
        &self,
        target: &ShardTarget,
        id: i64,
        update: SendOutcomeUpdate,
    ) -> Result<()> {
        let target = target.clone();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let sql = qualify(UPDATE_ON_SEND_SQL, &table_name(&target));
            conn.execute(&sql, params![update.status.code(), update.send_times, update.utime, id])
                .map_err(map_storage_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update_bulk_by_keys(
        &self,
        target: &ShardTarget,
        keys: &[String],
        status: OutboxStatus,
        utime: i64,
    ) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let target = target.clone();
        let keys = keys.to_vec();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.get_connection()?;
            let table = table_name(&target);
            let placeholders = keys.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!(
                "UPDATE {table} SET status = ?, send_times = send_times + 1, utime = ? \
                 WHERE msg_key IN ({placeholders})"
            );
            let tx = conn.transaction().map_err(map_storage_error)?;
            let mut args: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(status.code()), Box::new(utime)];
            args.extend(keys.into_iter().map(|k| Box::new(k) as Box<dyn rusqlite::ToSql>));
            let touched = tx
                .execute(&sql, params_from_iter(args.iter().map(|a| a.as_ref())))
                .map_err(map_storage_error)?;
            tx.commit().map_err(map_storage_error)?;
            Ok(touched as u64)
        })
        .await
        .map_err(map_join_error)?
    }
}

trait OutboxQueryOwned {
    fn clone_owned(&self) -> OutboxQuery;
}

impl OutboxQueryOwned for OutboxQuery {
    fn clone_owned(&self) -> OutboxQuery {
        OutboxQuery {
            status: self.status,
            key: self.key.clone(),
            ctime_from: self.ctime_from,
            ctime_to: self.ctime_to,
            limit: self.limit,
            offset: self.offset,
        }
    }
}
