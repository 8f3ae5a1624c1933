//! Reputation registry tables: feedback entries and authorization usage

use ethers::types::H256;
use rusqlite::OptionalExtension;

use super::super::sqlite::{address_from_sql, address_to_sql, h256_from_sql};
use super::super::Database;
use crate::error::{RegistryError, RegistryResult};
use crate::store::{ReputationStore, ReputationWrite, WriteBatch};
use crate::types::FeedbackEntry;

const FEEDBACK_COLUMNS: &str = "agent_id, feedback_index, client, score, tag1, tag2,
                                content_uri, content_hash, timestamp";

fn row_to_feedback(row: &rusqlite::Row) -> rusqlite::Result<FeedbackEntry> {
    Ok(FeedbackEntry {
        agent_id: row.get::<_, i64>(0)? as u64,
        index: row.get::<_, i64>(1)? as u64,
        client: address_from_sql(2, row.get(2)?)?,
        score: row.get(3)?,
        tag1: h256_from_sql(4, row.get(4)?)?,
        tag2: h256_from_sql(5, row.get(5)?)?,
        content_uri: row.get(6)?,
        content_hash: h256_from_sql(7, row.get(7)?)?,
        timestamp: row.get::<_, i64>(8)? as u64,
    })
}

impl ReputationStore for Database {
    fn feedback(&self, agent_id: u64, index: u64) -> RegistryResult<Option<FeedbackEntry>> {
        let entry = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM feedback WHERE agent_id = ?1 AND feedback_index = ?2",
                    FEEDBACK_COLUMNS
                ),
                rusqlite::params![agent_id as i64, index as i64],
                row_to_feedback,
            )
            .optional()?;
        Ok(entry)
    }

    fn feedback_count(&self, agent_id: u64) -> RegistryResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM feedback WHERE agent_id = ?1",
            rusqlite::params![agent_id as i64],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    fn feedback_range(&self, agent_id: u64, start: u64, end: u64) -> RegistryResult<Vec<FeedbackEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM feedback
             WHERE agent_id = ?1 AND feedback_index BETWEEN ?2 AND ?3
             ORDER BY feedback_index ASC",
            FEEDBACK_COLUMNS
        ))?;
        let entries = stmt
            .query_map(
                rusqlite::params![agent_id as i64, start as i64, end as i64],
                row_to_feedback,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn auth_usage(&self, key: H256) -> RegistryResult<u64> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT count FROM auth_usage WHERE usage_key = ?1",
                rusqlite::params![key.as_bytes()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0) as u64)
    }

    fn commit(&mut self, batch: WriteBatch<ReputationWrite>) -> RegistryResult<()> {
        let WriteBatch { writes, events } = batch;
        self.commit_with(events, |tx| {
            for write in &writes {
                match write {
                    ReputationWrite::AppendFeedback(entry) => {
                        let count: i64 = tx.query_row(
                            "SELECT COUNT(*) FROM feedback WHERE agent_id = ?1",
                            rusqlite::params![entry.agent_id as i64],
                            |r| r.get(0),
                        )?;
                        if entry.index != count as u64 + 1 {
                            return Err(RegistryError::Storage(format!(
                                "feedback index {} out of sequence for agent {} (count {})",
                                entry.index, entry.agent_id, count
                            )));
                        }
                        tx.execute(
                            &format!(
                                "INSERT INTO feedback ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                                FEEDBACK_COLUMNS
                            ),
                            rusqlite::params![
                                entry.agent_id as i64,
                                entry.index as i64,
                                address_to_sql(&entry.client),
                                entry.score,
                                entry.tag1.as_bytes(),
                                entry.tag2.as_bytes(),
                                entry.content_uri,
                                entry.content_hash.as_bytes(),
                                entry.timestamp as i64,
                            ],
                        )?;
                    }
                    ReputationWrite::SetAuthUsage { key, count } => {
                        tx.execute(
                            "INSERT INTO auth_usage (usage_key, count) VALUES (?1, ?2)
                             ON CONFLICT(usage_key) DO UPDATE SET count = excluded.count",
                            rusqlite::params![key.as_bytes(), *count as i64],
                        )?;
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn entry(index: u64, score: u8) -> FeedbackEntry {
        FeedbackEntry {
            agent_id: 3,
            index,
            client: Address::repeat_byte(5),
            score,
            tag1: crate::types::tag("speed"),
            tag2: H256::zero(),
            content_uri: format!("ipfs://fb/{}", index),
            content_hash: H256::repeat_byte(index as u8),
            timestamp: 1_700_000_000 + index,
        }
    }

    #[test]
    fn test_feedback_roundtrip() {
        let mut db = Database::new(":memory:").unwrap();
        for i in 1..=3 {
            let mut batch = WriteBatch::new();
            batch.write(ReputationWrite::AppendFeedback(entry(i, 50 + i as u8)));
            ReputationStore::commit(&mut db, batch).unwrap();
        }

        assert_eq!(db.feedback_count(3).unwrap(), 3);
        assert_eq!(db.feedback(3, 2).unwrap(), Some(entry(2, 52)));
        assert_eq!(db.feedback(3, 9).unwrap(), None);
        assert_eq!(db.feedback_range(3, 1, 3).unwrap(), vec![entry(1, 51), entry(2, 52), entry(3, 53)]);
    }

    #[test]
    fn test_gap_rolls_back_usage() {
        let mut db = Database::new(":memory:").unwrap();
        let key = H256::repeat_byte(0x42);
        let mut batch = WriteBatch::new();
        batch
            .write(ReputationWrite::SetAuthUsage { key, count: 1 })
            .write(ReputationWrite::AppendFeedback(entry(5, 90)));
        assert!(ReputationStore::commit(&mut db, batch).is_err());
        assert_eq!(db.auth_usage(key).unwrap(), 0);

        let mut batch = WriteBatch::new();
        batch.write(ReputationWrite::SetAuthUsage { key, count: 2 });
        ReputationStore::commit(&mut db, batch).unwrap();
        assert_eq!(db.auth_usage(key).unwrap(), 2);
    }
}
