//! SQLite-backed ledger state.
//!
//! One schema holds the tables of all three registries; each registry opens
//! its own connection under its own event scope, so a single file can back a
//! whole ledger. Every `commit` runs inside a single transaction.

use std::str::FromStr;

use ethers::types::{Address, H256};
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction};

use crate::error::{RegistryError, RegistryResult};
use crate::events::{EventRecord, RegistryEvent};
use crate::store::EventLog;

const DEFAULT_SCOPE: &str = "ledger";

pub struct Database {
    conn: Connection,
    /// Event log partition this connection reads and writes
    scope: String,
}

impl Database {
    /// Open (or create) the database at `path`; `":memory:"` gives a private in-memory db
    pub fn new(path: &str) -> RegistryResult<Self> {
        Self::scoped(path, DEFAULT_SCOPE)
    }

    /// Open `path` with events recorded under `scope` (e.g. `"identity"`)
    pub fn scoped(path: &str, scope: &str) -> RegistryResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        let db = Self {
            conn,
            scope: scope.to_string(),
        };
        db.create_tables()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    fn create_tables(&self) -> RegistryResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agents (
                agent_id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                delegate TEXT,
                uri TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS operator_approvals (
                owner TEXT NOT NULL,
                operator TEXT NOT NULL,
                PRIMARY KEY (owner, operator)
            );
            CREATE TABLE IF NOT EXISTS agent_metadata (
                agent_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (agent_id, key)
            );
            CREATE TABLE IF NOT EXISTS feedback (
                agent_id INTEGER NOT NULL,
                feedback_index INTEGER NOT NULL,
                client TEXT NOT NULL,
                score INTEGER NOT NULL,
                tag1 BLOB NOT NULL,
                tag2 BLOB NOT NULL,
                content_uri TEXT NOT NULL,
                content_hash BLOB NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (agent_id, feedback_index)
            );
            CREATE TABLE IF NOT EXISTS auth_usage (
                usage_key BLOB PRIMARY KEY,
                count INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS validation_requests (
                request_id INTEGER PRIMARY KEY,
                agent_id INTEGER NOT NULL,
                client TEXT NOT NULL,
                request_uri TEXT NOT NULL,
                request_hash BLOB NOT NULL,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                response_uri TEXT,
                response_hash BLOB,
                response_timestamp INTEGER,
                is_valid INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_validation_agent
                ON validation_requests(agent_id, request_id);
            CREATE INDEX IF NOT EXISTS idx_validation_client
                ON validation_requests(client, request_id);
            CREATE TABLE IF NOT EXISTS registry_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                scope TEXT NOT NULL,
                name TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_registry_events_scope
                ON registry_events(scope, seq);",
        )?;
        Ok(())
    }

    /// Run `f` inside one transaction and append `events` to the log.
    /// Nothing is kept if `f` or the event insert fails.
    pub(crate) fn commit_with<F>(&mut self, events: Vec<RegistryEvent>, f: F) -> RegistryResult<()>
    where
        F: FnOnce(&Transaction<'_>) -> RegistryResult<()>,
    {
        let tx = self.conn.transaction()?;
        f(&tx)?;
        for event in &events {
            let payload = serde_json::to_string(event)
                .map_err(|e| RegistryError::Storage(format!("Failed to encode event: {}", e)))?;
            tx.execute(
                "INSERT INTO registry_events (scope, name, payload) VALUES (?1, ?2, ?3)",
                rusqlite::params![self.scope, event.name(), payload],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl EventLog for Database {
    fn events_since(&self, after: u64) -> RegistryResult<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, payload FROM registry_events
             WHERE scope = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![self.scope, after as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, payload)| {
                let event: RegistryEvent = serde_json::from_str(&payload).map_err(|e| {
                    RegistryError::Storage(format!("Corrupt event #{}: {}", seq, e))
                })?;
                Ok(EventRecord {
                    seq: seq as u64,
                    event,
                })
            })
            .collect()
    }
}

// ── Column codecs ───────────────────────────────────────

pub(crate) fn address_to_sql(address: &Address) -> String {
    format!("{:?}", address)
}

pub(crate) fn address_from_sql(idx: usize, value: String) -> rusqlite::Result<Address> {
    Address::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn h256_from_sql(idx: usize, value: Vec<u8>) -> rusqlite::Result<H256> {
    if value.len() != 32 {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Blob,
            format!("expected 32 bytes, got {}", value.len()).into(),
        ));
    }
    Ok(H256::from_slice(&value))
}
