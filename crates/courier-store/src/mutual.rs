//! Mutual (friend / invite) request records.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use courier_shared::{ClientId, MutualKind, MutualRequest, TopicId};

use crate::clients::add_friendship;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{from_column, to_column, uuid_column, Resolution};
use crate::topics::add_member;

const SELECT_REQUEST: &str = "SELECT uuid, from_id, to_id, kind, topic_id, created_at, resolved
                              FROM mutual_requests";

impl Database {
    pub fn record_mutual_request(&self, request: &MutualRequest) -> Result<()> {
        self.conn().execute(
            "INSERT INTO mutual_requests (uuid, from_id, to_id, kind, topic_id, created_at, resolved)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request.uuid.to_string(),
                request.from.as_str(),
                request.to.as_str(),
                request.kind.as_str(),
                request.topic.as_ref().map(|t| t.as_str()),
                to_column(&request.time),
                request.resolved,
            ],
        )?;
        Ok(())
    }

    pub fn get_mutual_request(&self, uuid: Uuid) -> Result<Option<MutualRequest>> {
        get_request(self.conn(), uuid)
    }

    /// Unresolved requests addressed to `client`, oldest first.
    pub fn pending_mutual_requests(&self, client: &ClientId) -> Result<Vec<MutualRequest>> {
        let sql = format!(
            "{SELECT_REQUEST} WHERE to_id = ?1 AND resolved = 0 ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![client.as_str()], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// The target's client confirmed it received the request. Receipts
    /// from anyone else match nothing.
    pub fn mark_mutual_read(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE mutual_requests SET is_read = 1 WHERE uuid = ?1 AND to_id = ?2",
            params![uuid.to_string(), recipient.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Resolve a request at most once. On acceptance the relationship change
    /// (friendship on both sides, or topic membership) is applied in the same
    /// transaction as the resolution, so a failure leaves nothing half done.
    pub fn resolve_mutual_request(&mut self, uuid: Uuid, accept: bool) -> Result<Resolution> {
        let tx = self.conn_mut().transaction()?;

        let mut request = get_request(&tx, uuid)?.ok_or(StoreError::NotFound)?;
        if request.resolved {
            return Ok(Resolution::AlreadyResolved(request));
        }

        let claimed = tx.execute(
            "UPDATE mutual_requests SET resolved = 1, is_read = 1
             WHERE uuid = ?1 AND resolved = 0",
            params![uuid.to_string()],
        )?;
        if claimed == 0 {
            return Ok(Resolution::AlreadyResolved(request));
        }
        request.resolved = true;

        if accept {
            apply_acceptance(&tx, &request)?;
        }
        tx.commit()?;

        tracing::debug!(uuid = %uuid, kind = %request.kind, accept, "mutual request resolved");

        Ok(if accept {
            Resolution::Accepted(request)
        } else {
            Resolution::Refused(request)
        })
    }
}

fn apply_acceptance(conn: &Connection, request: &MutualRequest) -> Result<()> {
    match request.kind {
        MutualKind::AddFriend => add_friendship(conn, &request.from, &request.to),
        MutualKind::AddTopic => {
            let topic = request_topic(request)?;
            add_member(conn, topic, &request.from).map(|_| ())
        }
        MutualKind::InviteTopic => {
            let topic = request_topic(request)?;
            add_member(conn, topic, &request.to).map(|_| ())
        }
    }
}

fn request_topic(request: &MutualRequest) -> Result<&TopicId> {
    request
        .topic
        .as_ref()
        .ok_or_else(|| StoreError::InvalidValue(format!("{} request without topic", request.kind)))
}

fn get_request(conn: &Connection, uuid: Uuid) -> Result<Option<MutualRequest>> {
    let sql = format!("{SELECT_REQUEST} WHERE uuid = ?1");
    let request = conn
        .query_row(&sql, params![uuid.to_string()], row_to_request)
        .optional()?;
    Ok(request)
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<MutualRequest> {
    let uuid: String = row.get(0)?;
    let from: String = row.get(1)?;
    let to: String = row.get(2)?;
    let kind: String = row.get(3)?;
    let topic: Option<String> = row.get(4)?;
    let created: String = row.get(5)?;

    let kind = MutualKind::parse(&kind).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(MutualRequest {
        uuid: uuid_column(0, &uuid)?,
        from: ClientId::new(from),
        to: ClientId::new(to),
        kind,
        topic: topic.map(TopicId::new),
        time: from_column(5, &created)?,
        resolved: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TopicRecord;
    use chrono::Utc;
    use courier_shared::NodeAddr;

    fn ask(kind: MutualKind, topic: Option<&str>) -> MutualRequest {
        MutualRequest::new(
            ClientId::from("alice"),
            ClientId::from("bob"),
            kind,
            topic.map(TopicId::from),
        )
    }

    #[test]
    fn test_pending_until_resolved() {
        let mut db = Database::open_in_memory().unwrap();
        let req = ask(MutualKind::AddFriend, None);
        db.record_mutual_request(&req).unwrap();

        let pending = db.pending_mutual_requests(&ClientId::from("bob")).unwrap();
        assert_eq!(pending, vec![req.clone()]);
        assert!(!db
            .mark_mutual_read(req.uuid, &ClientId::from("alice"))
            .unwrap());
        assert!(db.mark_mutual_read(req.uuid, &ClientId::from("bob")).unwrap());
        // Reading does not resolve.
        assert_eq!(
            db.pending_mutual_requests(&ClientId::from("bob"))
                .unwrap()
                .len(),
            1
        );

        match db.resolve_mutual_request(req.uuid, true).unwrap() {
            Resolution::Accepted(r) => assert!(r.resolved),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(db
            .pending_mutual_requests(&ClientId::from("bob"))
            .unwrap()
            .is_empty());
        assert!(db
            .are_friends(&ClientId::from("alice"), &ClientId::from("bob"))
            .unwrap());
    }

    #[test]
    fn test_resolved_at_most_once() {
        let mut db = Database::open_in_memory().unwrap();
        let req = ask(MutualKind::AddFriend, None);
        db.record_mutual_request(&req).unwrap();

        assert!(matches!(
            db.resolve_mutual_request(req.uuid, false).unwrap(),
            Resolution::Refused(_)
        ));
        assert!(matches!(
            db.resolve_mutual_request(req.uuid, true).unwrap(),
            Resolution::AlreadyResolved(_)
        ));
        // The late acceptance must not have created a friendship.
        assert!(!db
            .are_friends(&ClientId::from("alice"), &ClientId::from("bob"))
            .unwrap());
    }

    #[test]
    fn test_unknown_request() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.resolve_mutual_request(Uuid::new_v4(), true),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_invite_adds_target_to_topic() {
        let mut db = Database::open_in_memory().unwrap();
        db.create_topic(&TopicRecord {
            topic: TopicId::from("rust"),
            founder: ClientId::from("alice"),
            node: NodeAddr::from("n1"),
            created_at: Utc::now(),
        })
        .unwrap();
        let req = ask(MutualKind::InviteTopic, Some("rust"));
        db.record_mutual_request(&req).unwrap();

        db.resolve_mutual_request(req.uuid, true).unwrap();
        assert!(db
            .is_topic_member(&TopicId::from("rust"), &ClientId::from("bob"))
            .unwrap());
    }

    #[test]
    fn test_failed_acceptance_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        // Topic does not exist: the membership insert violates the foreign key.
        let req = ask(MutualKind::InviteTopic, Some("ghost"));
        db.record_mutual_request(&req).unwrap();

        assert!(db.resolve_mutual_request(req.uuid, true).is_err());
        let stored = db.get_mutual_request(req.uuid).unwrap().unwrap();
        assert!(!stored.resolved);
    }
}
