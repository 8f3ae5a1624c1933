//! Validation registry table: requests with their optional response

use ethers::types::Address;
use rusqlite::OptionalExtension;
use rusqlite::types::Type;

use super::super::sqlite::{address_from_sql, address_to_sql, h256_from_sql};
use super::super::Database;
use crate::error::{RegistryError, RegistryResult};
use crate::store::{ValidationStore, ValidationWrite, WriteBatch};
use crate::types::{ValidationRecord, ValidationRequest, ValidationResponse, ValidationStatus};

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ValidationRecord> {
    let status: String = row.get(6)?;
    let status: ValidationStatus = status
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;

    let request = ValidationRequest {
        request_id: row.get::<_, i64>(0)? as u64,
        agent_id: row.get::<_, i64>(1)? as u64,
        client: address_from_sql(2, row.get(2)?)?,
        request_uri: row.get(3)?,
        request_hash: h256_from_sql(4, row.get(4)?)?,
        timestamp: row.get::<_, i64>(5)? as u64,
        status,
    };

    let response_uri: Option<String> = row.get(7)?;
    let response = match response_uri {
        Some(response_uri) => Some(ValidationResponse {
            response_uri,
            response_hash: h256_from_sql(8, row.get(8)?)?,
            timestamp: row.get::<_, i64>(9)? as u64,
            is_valid: row.get(10)?,
        }),
        None => None,
    };

    Ok(ValidationRecord { request, response })
}

impl ValidationStore for Database {
    fn record(&self, request_id: u64) -> RegistryResult<Option<ValidationRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT request_id, agent_id, client, request_uri, request_hash, timestamp,
                        status, response_uri, response_hash, response_timestamp, is_valid
                 FROM validation_requests WHERE request_id = ?1",
                rusqlite::params![request_id as i64],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn request_count(&self) -> RegistryResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM validation_requests", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn agent_requests(&self, agent_id: u64) -> RegistryResult<Vec<u64>> {
        let mut stmt = self.conn().prepare(
            "SELECT request_id FROM validation_requests WHERE agent_id = ?1 ORDER BY request_id ASC",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![agent_id as i64], |r| r.get::<_, i64>(0))?
            .map(|r| r.map(|id| id as u64))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn client_requests(&self, client: Address) -> RegistryResult<Vec<u64>> {
        let mut stmt = self.conn().prepare(
            "SELECT request_id FROM validation_requests WHERE client = ?1 ORDER BY request_id ASC",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![address_to_sql(&client)], |r| r.get::<_, i64>(0))?
            .map(|r| r.map(|id| id as u64))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn commit(&mut self, batch: WriteBatch<ValidationWrite>) -> RegistryResult<()> {
        let WriteBatch { writes, events } = batch;
        self.commit_with(events, |tx| {
            for write in &writes {
                match write {
                    ValidationWrite::InsertRequest(req) => {
                        tx.execute(
                            "INSERT INTO validation_requests
                             (request_id, agent_id, client, request_uri, request_hash, timestamp, status)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            rusqlite::params![
                                req.request_id as i64,
                                req.agent_id as i64,
                                address_to_sql(&req.client),
                                req.request_uri,
                                req.request_hash.as_bytes(),
                                req.timestamp as i64,
                                req.status.to_string(),
                            ],
                        )?;
                    }
                    ValidationWrite::UpdateRecord(record) => {
                        let response = record.response.as_ref();
                        let rows = tx.execute(
                            "UPDATE validation_requests
                             SET status = ?1, response_uri = ?2, response_hash = ?3,
                                 response_timestamp = ?4, is_valid = ?5
                             WHERE request_id = ?6",
                            rusqlite::params![
                                record.request.status.to_string(),
                                response.map(|r| r.response_uri.clone()),
                                response.map(|r| r.response_hash.as_bytes().to_vec()),
                                response.map(|r| r.timestamp as i64),
                                response.map(|r| r.is_valid),
                                record.request.request_id as i64,
                            ],
                        )?;
                        if rows == 0 {
                            return Err(RegistryError::Storage(format!(
                                "update of unknown validation request {}",
                                record.request.request_id
                            )));
                        }
                    }
                }
            }
            Ok(())
        })
    }
}
