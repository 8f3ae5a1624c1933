//! Identity registry tables: agents, operator approvals, metadata

use ethers::types::Address;
use rusqlite::OptionalExtension;

use super::super::sqlite::{address_from_sql, address_to_sql};
use super::super::Database;
use crate::error::RegistryResult;
use crate::store::{IdentityStore, IdentityWrite, WriteBatch};
use crate::types::AgentRecord;

impl IdentityStore for Database {
    fn agent(&self, agent_id: u64) -> RegistryResult<Option<AgentRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT agent_id, owner, delegate, uri FROM agents WHERE agent_id = ?1",
                rusqlite::params![agent_id as i64],
                |row| {
                    let delegate: Option<String> = row.get(2)?;
                    Ok(AgentRecord {
                        agent_id: row.get::<_, i64>(0)? as u64,
                        owner: address_from_sql(1, row.get(1)?)?,
                        delegate: delegate.map(|d| address_from_sql(2, d)).transpose()?,
                        uri: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn agent_count(&self) -> RegistryResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM agents", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn is_operator(&self, owner: Address, operator: Address) -> RegistryResult<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM operator_approvals WHERE owner = ?1 AND operator = ?2",
                rusqlite::params![address_to_sql(&owner), address_to_sql(&operator)],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn metadata(&self, agent_id: u64, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM agent_metadata WHERE agent_id = ?1 AND key = ?2",
                rusqlite::params![agent_id as i64, key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn commit(&mut self, batch: WriteBatch<IdentityWrite>) -> RegistryResult<()> {
        let WriteBatch { writes, events } = batch;
        self.commit_with(events, |tx| {
            for write in &writes {
                match write {
                    IdentityWrite::PutAgent(record) => {
                        tx.execute(
                            "INSERT INTO agents (agent_id, owner, delegate, uri)
                             VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT(agent_id) DO UPDATE SET
                                owner = excluded.owner,
                                delegate = excluded.delegate,
                                uri = excluded.uri",
                            rusqlite::params![
                                record.agent_id as i64,
                                address_to_sql(&record.owner),
                                record.delegate.as_ref().map(address_to_sql),
                                record.uri,
                            ],
                        )?;
                    }
                    IdentityWrite::SetOperator {
                        owner,
                        operator,
                        approved,
                    } => {
                        if *approved {
                            tx.execute(
                                "INSERT OR IGNORE INTO operator_approvals (owner, operator) VALUES (?1, ?2)",
                                rusqlite::params![address_to_sql(owner), address_to_sql(operator)],
                            )?;
                        } else {
                            tx.execute(
                                "DELETE FROM operator_approvals WHERE owner = ?1 AND operator = ?2",
                                rusqlite::params![address_to_sql(owner), address_to_sql(operator)],
                            )?;
                        }
                    }
                    IdentityWrite::PutMetadata {
                        agent_id,
                        key,
                        value,
                    } => {
                        tx.execute(
                            "INSERT INTO agent_metadata (agent_id, key, value) VALUES (?1, ?2, ?3)
                             ON CONFLICT(agent_id, key) DO UPDATE SET value = excluded.value",
                            rusqlite::params![*agent_id as i64, key, value],
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

    #[test]
    fn test_agent_upsert_and_metadata() {
        let mut db = Database::new(":memory:").unwrap();
        let owner = Address::repeat_byte(1);
        let mut batch = WriteBatch::new();
        batch
            .write(IdentityWrite::PutAgent(AgentRecord {
                agent_id: 1,
                owner,
                delegate: None,
                uri: "ipfs://agent".to_string(),
            }))
            .write(IdentityWrite::PutMetadata {
                agent_id: 1,
                key: "name".to_string(),
                value: b"alpha".to_vec(),
            });
        IdentityStore::commit(&mut db, batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.write(IdentityWrite::PutAgent(AgentRecord {
            agent_id: 1,
            owner,
            delegate: Some(Address::repeat_byte(2)),
            uri: "ipfs://agent-v2".to_string(),
        }));
        IdentityStore::commit(&mut db, batch).unwrap();

        let agent = db.agent(1).unwrap().unwrap();
        assert_eq!(agent.delegate, Some(Address::repeat_byte(2)));
        assert_eq!(agent.uri, "ipfs://agent-v2");
        assert_eq!(db.agent_count().unwrap(), 1);
        assert_eq!(db.metadata(1, "name").unwrap(), Some(b"alpha".to_vec()));
        assert_eq!(db.metadata(1, "missing").unwrap(), None);
        assert!(db.agent(2).unwrap().is_none());
    }

    #[test]
    fn test_operator_toggle() {
        let mut db = Database::new(":memory:").unwrap();
        let owner = Address::repeat_byte(1);
        let operator = Address::repeat_byte(3);

        for approved in [true, true, false] {
            let mut batch = WriteBatch::new();
            batch.write(IdentityWrite::SetOperator {
                owner,
                operator,
                approved,
            });
            IdentityStore::commit(&mut db, batch).unwrap();
            assert_eq!(db.is_operator(owner, operator).unwrap(), approved);
        }
    }
}
