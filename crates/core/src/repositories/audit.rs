//! Append-only audit trail.
//!
//! Recording is best-effort: a failed audit write is logged and swallowed so
//! it can never fail the operation it describes. Reads are bounded.

use crate::db::now_rfc3339;
use crate::{HmisResult, Store};
use rusqlite::params;
use serde::Serialize;

pub const MAX_TRAIL_ROWS: i64 = 200;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_profile_id: Option<i64>,
    pub action: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub details: String,
    pub remote_addr: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct AuditService {
    store: Store,
}

impl AuditService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record an action against an entity. Never fails the caller.
    pub fn record(
        &self,
        actor_profile_id: Option<i64>,
        action: &str,
        entity_kind: &str,
        entity_id: &str,
        details: &str,
        remote_addr: &str,
    ) {
        let outcome = self.store.conn().execute(
            "INSERT INTO audit_log
                 (actor_profile_id, action, entity_kind, entity_id, details, remote_addr, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                actor_profile_id,
                action,
                entity_kind,
                entity_id,
                details,
                remote_addr,
                now_rfc3339(),
            ],
        );
        if let Err(e) = outcome {
            tracing::warn!("audit write failed ({action} {entity_kind}/{entity_id}): {e}");
        }
    }

    /// Trail for one entity, newest first, capped at `MAX_TRAIL_ROWS`.
    pub fn trail(&self, entity_kind: &str, entity_id: &str) -> HmisResult<Vec<AuditEntry>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM audit_log
             WHERE entity_kind = ?1 AND entity_id = ?2
             ORDER BY id DESC LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![entity_kind, entity_id, MAX_TRAIL_ROWS], entry_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most recent activity across the whole system.
    pub fn recent(&self, limit: i64) -> HmisResult<Vec<AuditEntry>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit.min(MAX_TRAIL_ROWS)], entry_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const COLUMNS: &str = "id, actor_profile_id, action, entity_kind, entity_id, details, \
                       remote_addr, created_at";

fn entry_row(row: &rusqlite::Row) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        actor_profile_id: row.get(1)?,
        action: row.get(2)?,
        entity_kind: row.get(3)?,
        entity_id: row.get(4)?,
        details: row.get(5)?,
        remote_addr: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_is_newest_first() {
        let svc = AuditService::new(Store::open_in_memory().unwrap());
        svc.record(None, "create", "patient", "1", "", "");
        svc.record(None, "update", "patient", "1", "phone changed", "");
        svc.record(None, "create", "patient", "2", "", "");

        let trail = svc.trail("patient", "1").unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, "update");
        assert_eq!(svc.recent(10).unwrap().len(), 3);
    }

    #[test]
    fn recent_is_capped() {
        let svc = AuditService::new(Store::open_in_memory().unwrap());
        for i in 0..5 {
            svc.record(None, "create", "patient", &i.to_string(), "", "");
        }
        assert_eq!(svc.recent(2).unwrap().len(), 2);
    }
}
