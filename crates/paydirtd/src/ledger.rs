//! Sqlite ledger — the engine's local durable record of caravans, known
//! issues, and orchestration events.
//!
//! The issue tracker remains the source of truth for issue state; the
//! ledger's issue rows exist so cold-start reconciliation knows which ids
//! to query back, and so `survey`/`ledger` can render without network I/O.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use pd_core::events::{event_kind_tag, Event};
use pd_core::state::CaravanStatus;
use pd_core::types::{Caravan, ClaimId, Issue, IssueId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// A cached issue row plus the caravan that owns it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub issue: Issue,
    pub claim_id: Option<ClaimId>,
}

#[derive(Debug)]
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<(), LedgerError> {
        self.conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS caravans (
    claim_id TEXT PRIMARY KEY,
    status_tag TEXT NOT NULL,
    work_issue TEXT,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_caravans_status ON caravans(status_tag);
CREATE INDEX IF NOT EXISTS idx_caravans_work ON caravans(work_issue);

CREATE TABLE IF NOT EXISTS issues (
    issue_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    claim_id TEXT,
    payload_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_claim ON issues(claim_id);

CREATE TABLE IF NOT EXISTS events (
    event_id TEXT PRIMARY KEY,
    claim_id TEXT,
    issue_id TEXT,
    at TEXT NOT NULL,
    kind_tag TEXT NOT NULL,
    payload_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_claim_at ON events(claim_id, at);
CREATE INDEX IF NOT EXISTS idx_events_at ON events(at);
"#,
        )?;
        Ok(())
    }

    pub fn upsert_caravan(&self, caravan: &Caravan) -> Result<(), LedgerError> {
        let payload = serde_json::to_string(caravan)?;
        self.conn.execute(
            r#"
INSERT INTO caravans (claim_id, status_tag, work_issue, payload_json, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(claim_id) DO UPDATE SET
  status_tag = excluded.status_tag,
  work_issue = excluded.work_issue,
  payload_json = excluded.payload_json,
  updated_at = excluded.updated_at
"#,
            params![
                caravan.claim_id.0,
                caravan.status.as_str(),
                caravan.work_issue.as_ref().map(|id| id.0.clone()),
                payload,
                caravan.created_at.to_rfc3339(),
                caravan.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_caravan(&self, claim_id: &ClaimId) -> Result<Option<Caravan>, LedgerError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM caravans WHERE claim_id = ?1",
                params![claim_id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<Caravan>(&value))
            .transpose()
            .map_err(LedgerError::from)
    }

    pub fn list_caravans(&self) -> Result<Vec<Caravan>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM caravans ORDER BY updated_at DESC, claim_id ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut caravans = Vec::new();
        for row in rows {
            let payload = row?;
            caravans.push(serde_json::from_str::<Caravan>(&payload)?);
        }
        Ok(caravans)
    }

    pub fn list_caravans_by_status(
        &self,
        status: &CaravanStatus,
    ) -> Result<Vec<Caravan>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM caravans WHERE status_tag = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![status.as_str()], |row| row.get::<_, String>(0))?;
        let mut caravans = Vec::new();
        for row in rows {
            let payload = row?;
            caravans.push(serde_json::from_str::<Caravan>(&payload)?);
        }
        Ok(caravans)
    }

    pub fn find_caravan_by_work_issue(
        &self,
        work: &IssueId,
    ) -> Result<Option<Caravan>, LedgerError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM caravans WHERE work_issue = ?1 ORDER BY updated_at DESC LIMIT 1",
                params![work.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<Caravan>(&value))
            .transpose()
            .map_err(LedgerError::from)
    }

    pub fn upsert_issue(&self, record: &IssueRecord) -> Result<(), LedgerError> {
        let payload = serde_json::to_string(&record.issue)?;
        self.conn.execute(
            r#"
INSERT INTO issues (issue_id, kind, status, claim_id, payload_json, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(issue_id) DO UPDATE SET
  status = excluded.status,
  claim_id = COALESCE(excluded.claim_id, issues.claim_id),
  payload_json = excluded.payload_json,
  updated_at = excluded.updated_at
"#,
            params![
                record.issue.id.0,
                record.issue.kind.as_str(),
                record.issue.status.as_str(),
                record.claim_id.as_ref().map(|id| id.0.clone()),
                payload,
                record.issue.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Every issue id the ledger has ever seen — the reconciliation
    /// work-list after a restart.
    pub fn list_known_issue_ids(&self) -> Result<Vec<IssueId>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id FROM issues ORDER BY issue_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(IssueId::new(row?));
        }
        Ok(ids)
    }

    pub fn append_event(&self, event: &Event) -> Result<(), LedgerError> {
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            r#"
INSERT INTO events (event_id, claim_id, issue_id, at, kind_tag, payload_json)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
            params![
                event.id.0,
                event.claim_id.as_ref().map(|id| id.0.clone()),
                event.issue_id.as_ref().map(|id| id.0.clone()),
                event.at.to_rfc3339(),
                event_kind_tag(&event.kind),
                payload,
            ],
        )?;
        Ok(())
    }

    pub fn list_events_for_claim(&self, claim_id: &ClaimId) -> Result<Vec<Event>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM events WHERE claim_id = ?1 ORDER BY at ASC, event_id ASC",
        )?;
        let rows = stmt.query_map(params![claim_id.0], |row| row.get::<_, String>(0))?;
        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<Event>(&payload)?);
        }
        Ok(events)
    }

    pub fn list_events_with_tag(&self, kind_tag: &str) -> Result<Vec<Event>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM events WHERE kind_tag = ?1 ORDER BY at ASC, event_id ASC",
        )?;
        let rows = stmt.query_map(params![kind_tag], |row| row.get::<_, String>(0))?;
        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<Event>(&payload)?);
        }
        Ok(events)
    }

    pub fn list_recent_events(&self, limit: usize) -> Result<Vec<Event>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM events ORDER BY at DESC, event_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<Event>(&payload)?);
        }
        Ok(events)
    }

    /// Monotonic event-id helper: the ledger's event count plus one,
    /// prefixed for readability.
    pub fn next_event_id(&self, at: DateTime<Utc>) -> Result<String, LedgerError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(format!("E{}-{}", count + 1, at.timestamp_millis()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use pd_core::events::{Event, EventKind};
    use pd_core::state::{CaravanStatus, IssueKind};
    use pd_core::types::{Caravan, CaravanName, ClaimId, EventId, Issue, IssueId, ProspectRole};

    use super::{IssueRecord, SqliteLedger};

    fn mk_ledger() -> SqliteLedger {
        let ledger = SqliteLedger::open_in_memory().expect("open in-memory ledger");
        ledger.migrate().expect("migrate");
        ledger
    }

    fn mk_caravan(claim: &str, work: Option<&str>) -> Caravan {
        let mut caravan = Caravan::new(
            ClaimId::new(claim),
            CaravanName("auth-feature".to_string()),
            "Implement auth feature",
            ProspectRole::Miner,
            Utc::now(),
        );
        caravan.work_issue = work.map(IssueId::new);
        caravan
    }

    fn mk_event(id: &str, claim: Option<&str>) -> Event {
        Event {
            id: EventId(id.to_string()),
            claim_id: claim.map(ClaimId::new),
            issue_id: None,
            at: Utc::now(),
            kind: EventKind::CaravanStaked {
                task: "Implement auth feature".to_string(),
            },
        }
    }

    #[test]
    fn caravan_upsert_and_load_roundtrip() {
        let ledger = mk_ledger();
        let caravan = mk_caravan("pd-abc", Some("pd-w1"));
        ledger.upsert_caravan(&caravan).expect("upsert");

        let loaded = ledger
            .load_caravan(&ClaimId::new("pd-abc"))
            .expect("load")
            .expect("present");
        assert_eq!(loaded, caravan);

        assert!(ledger
            .load_caravan(&ClaimId::new("pd-missing"))
            .expect("load")
            .is_none());
    }

    #[test]
    fn upsert_replaces_status_and_work_issue() {
        let ledger = mk_ledger();
        let mut caravan = mk_caravan("pd-abc", None);
        ledger.upsert_caravan(&caravan).expect("insert");

        caravan.status = CaravanStatus::blocked();
        caravan.work_issue = Some(IssueId::new("pd-w1"));
        ledger.upsert_caravan(&caravan).expect("update");

        let loaded = ledger
            .load_caravan(&caravan.claim_id)
            .expect("load")
            .expect("present");
        assert_eq!(loaded.status, CaravanStatus::blocked());

        let by_work = ledger
            .find_caravan_by_work_issue(&IssueId::new("pd-w1"))
            .expect("query")
            .expect("present");
        assert_eq!(by_work.claim_id, caravan.claim_id);
    }

    #[test]
    fn list_caravans_by_status_filters() {
        let ledger = mk_ledger();
        let mut blocked = mk_caravan("pd-1", None);
        blocked.status = CaravanStatus::blocked();
        let working = mk_caravan("pd-2", None);

        ledger.upsert_caravan(&blocked).expect("insert blocked");
        ledger.upsert_caravan(&working).expect("insert working");

        let found = ledger
            .list_caravans_by_status(&CaravanStatus::blocked())
            .expect("list");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].claim_id, ClaimId::new("pd-1"));

        assert_eq!(ledger.list_caravans().expect("list all").len(), 2);
    }

    #[test]
    fn issue_rows_feed_the_reconciliation_work_list() {
        let ledger = mk_ledger();
        let now = Utc::now();
        for (id, kind) in [("pd-w1", IssueKind::Work), ("pd-d1", IssueKind::Decision)] {
            ledger
                .upsert_issue(&IssueRecord {
                    issue: Issue::new(IssueId::new(id), kind, "t", now),
                    claim_id: Some(ClaimId::new("pd-abc")),
                })
                .expect("upsert issue");
        }

        let ids = ledger.list_known_issue_ids().expect("list ids");
        assert_eq!(ids, vec![IssueId::new("pd-d1"), IssueId::new("pd-w1")]);
    }

    #[test]
    fn issue_upsert_keeps_existing_claim_when_new_is_none() {
        let ledger = mk_ledger();
        let now = Utc::now();
        let issue = Issue::new(IssueId::new("pd-w1"), IssueKind::Work, "t", now);
        ledger
            .upsert_issue(&IssueRecord {
                issue: issue.clone(),
                claim_id: Some(ClaimId::new("pd-abc")),
            })
            .expect("first upsert");
        ledger
            .upsert_issue(&IssueRecord {
                issue,
                claim_id: None,
            })
            .expect("second upsert");

        let claim: Option<String> = {
            use rusqlite::params;
            ledger
                .conn
                .query_row(
                    "SELECT claim_id FROM issues WHERE issue_id = ?1",
                    params!["pd-w1"],
                    |row| row.get(0),
                )
                .expect("query claim")
        };
        assert_eq!(claim, Some("pd-abc".to_string()));
    }

    #[test]
    fn events_list_per_claim_in_order_and_recent_across_claims() {
        let ledger = mk_ledger();
        ledger.append_event(&mk_event("E1", Some("pd-1"))).expect("e1");
        ledger.append_event(&mk_event("E2", Some("pd-1"))).expect("e2");
        ledger.append_event(&mk_event("E3", Some("pd-2"))).expect("e3");

        let for_claim = ledger
            .list_events_for_claim(&ClaimId::new("pd-1"))
            .expect("list");
        assert_eq!(for_claim.len(), 2);
        assert_eq!(for_claim[0].id, EventId("E1".to_string()));

        let recent = ledger.list_recent_events(2).expect("recent");
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn events_filter_by_kind_tag() {
        let ledger = mk_ledger();
        ledger.append_event(&mk_event("E1", Some("pd-1"))).expect("e1");

        let staked = ledger
            .list_events_with_tag("caravan_staked")
            .expect("filter");
        assert_eq!(staked.len(), 1);
        assert!(ledger
            .list_events_with_tag("worker_respawned")
            .expect("filter")
            .is_empty());
    }

    #[test]
    fn next_event_id_is_unique_per_append() {
        let ledger = mk_ledger();
        let now = Utc::now();
        let first = ledger.next_event_id(now).expect("id");
        ledger.append_event(&mk_event(&first, None)).expect("append");
        let second = ledger.next_event_id(now).expect("id");
        assert_ne!(first, second);
    }
}
