use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use courier_shared::{ClientId, DirectMessage, TopicId, TopicMessage};

use crate::database::Database;
use crate::error::Result;
use crate::models::{from_column, to_column, uuid_column, StoredMessage};

impl Database {
    pub fn record_p2p_message(&self, message: &DirectMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO p2p_messages (uuid, from_id, to_id, content, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.uuid.to_string(),
                message.from.as_str(),
                message.to.as_str(),
                message.content,
                to_column(&message.time),
            ],
        )?;
        Ok(())
    }

    /// Persist a topic message together with one pending delivery row per
    /// recipient.
    pub fn record_topic_message(
        &mut self,
        message: &TopicMessage,
        recipients: &[ClientId],
    ) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO topic_messages (uuid, topic_id, from_id, content, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.uuid.to_string(),
                message.topic.as_str(),
                message.from.as_str(),
                message.content,
                to_column(&message.time),
            ],
        )?;
        for recipient in recipients {
            tx.execute(
                "INSERT OR IGNORE INTO topic_deliveries (uuid, recipient_id) VALUES (?1, ?2)",
                params![message.uuid.to_string(), recipient.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_p2p_message(&self, uuid: Uuid) -> Result<Option<DirectMessage>> {
        let message = self
            .conn()
            .query_row(
                "SELECT uuid, from_id, to_id, content, sent_at
                 FROM p2p_messages WHERE uuid = ?1",
                params![uuid.to_string()],
                row_to_direct,
            )
            .optional()?;
        Ok(message)
    }

    pub fn get_topic_message(&self, uuid: Uuid) -> Result<Option<TopicMessage>> {
        let message = self
            .conn()
            .query_row(
                "SELECT uuid, topic_id, from_id, content, sent_at
                 FROM topic_messages WHERE uuid = ?1",
                params![uuid.to_string()],
                row_to_topic,
            )
            .optional()?;
        Ok(message)
    }

    /// Everything addressed to `client` that was never acknowledged, oldest
    /// first.
    pub fn read_undelivered_messages(&self, client: &ClientId) -> Result<Vec<StoredMessage>> {
        let mut out = Vec::new();

        let mut stmt = self.conn().prepare(
            "SELECT uuid, from_id, to_id, content, sent_at
             FROM p2p_messages
             WHERE to_id = ?1 AND delivered = 0
             ORDER BY sent_at ASC, rowid ASC",
        )?;
        for row in stmt.query_map(params![client.as_str()], row_to_direct)? {
            out.push(StoredMessage::Direct(row?));
        }

        let mut stmt = self.conn().prepare(
            "SELECT m.uuid, m.topic_id, m.from_id, m.content, m.sent_at
             FROM topic_deliveries d
             JOIN topic_messages m ON m.uuid = d.uuid
             WHERE d.recipient_id = ?1 AND d.delivered = 0
             ORDER BY m.sent_at ASC, m.rowid ASC",
        )?;
        for row in stmt.query_map(params![client.as_str()], row_to_topic)? {
            out.push(StoredMessage::Topic(row?));
        }

        // Stable: ties keep direct-before-topic.
        out.sort_by_key(|m| m.time());
        Ok(out)
    }

    /// Mark a direct message delivered. Only its addressee can; a receipt
    /// from anyone else matches no row and returns false.
    pub fn mark_p2p_delivered(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE p2p_messages SET delivered = 1 WHERE uuid = ?1 AND to_id = ?2",
            params![uuid.to_string(), recipient.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Mark one recipient's copy of a topic message delivered.
    pub fn mark_topic_delivered(&self, uuid: Uuid, recipient: &ClientId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE topic_deliveries SET delivered = 1
             WHERE uuid = ?1 AND recipient_id = ?2",
            params![uuid.to_string(), recipient.as_str()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_direct(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectMessage> {
    let uuid: String = row.get(0)?;
    let from: String = row.get(1)?;
    let to: String = row.get(2)?;
    let sent_at: String = row.get(4)?;
    Ok(DirectMessage {
        uuid: uuid_column(0, &uuid)?,
        from: ClientId::new(from),
        to: ClientId::new(to),
        content: row.get(3)?,
        time: from_column(4, &sent_at)?,
    })
}

fn row_to_topic(row: &rusqlite::Row<'_>) -> rusqlite::Result<TopicMessage> {
    let uuid: String = row.get(0)?;
    let topic: String = row.get(1)?;
    let from: String = row.get(2)?;
    let sent_at: String = row.get(4)?;
    Ok(TopicMessage {
        uuid: uuid_column(0, &uuid)?,
        topic: TopicId::new(topic),
        from: ClientId::new(from),
        content: row.get(3)?,
        time: from_column(4, &sent_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_offline_message_is_returned_verbatim() {
        let db = Database::open_in_memory().unwrap();
        let msg = DirectMessage::new(ClientId::from("alice"), ClientId::from("bob"), "hello bob");
        db.record_p2p_message(&msg).unwrap();

        let pending = db.read_undelivered_messages(&ClientId::from("bob")).unwrap();
        assert_eq!(pending, vec![StoredMessage::Direct(msg.clone())]);

        // The sender holds the uuid too, but cannot clear bob's copy.
        assert!(!db
            .mark_p2p_delivered(msg.uuid, &ClientId::from("alice"))
            .unwrap());
        assert_eq!(
            db.read_undelivered_messages(&ClientId::from("bob"))
                .unwrap()
                .len(),
            1
        );

        assert!(db.mark_p2p_delivered(msg.uuid, &ClientId::from("bob")).unwrap());
        assert!(db
            .read_undelivered_messages(&ClientId::from("bob"))
            .unwrap()
            .is_empty());
        // Still retrievable for retransmission lookups.
        assert_eq!(db.get_p2p_message(msg.uuid).unwrap(), Some(msg));
    }

    #[test]
    fn test_topic_delivery_is_per_recipient() {
        let mut db = Database::open_in_memory().unwrap();
        let bob = ClientId::from("bob");
        let carol = ClientId::from("carol");
        let msg = TopicMessage::new(TopicId::from("rust"), ClientId::from("alice"), "hi all");
        db.record_topic_message(&msg, &[bob.clone(), carol.clone()])
            .unwrap();

        assert!(db.mark_topic_delivered(msg.uuid, &bob).unwrap());

        assert!(db.read_undelivered_messages(&bob).unwrap().is_empty());
        assert_eq!(
            db.read_undelivered_messages(&carol).unwrap(),
            vec![StoredMessage::Topic(msg)]
        );
    }

    #[test]
    fn test_undelivered_ordered_by_time() {
        let mut db = Database::open_in_memory().unwrap();
        let bob = ClientId::from("bob");

        let mut late = DirectMessage::new(ClientId::from("alice"), bob.clone(), "second");
        late.time = Utc::now();
        let mut early = TopicMessage::new(TopicId::from("t"), ClientId::from("carol"), "first");
        early.time = late.time - Duration::seconds(30);

        db.record_p2p_message(&late).unwrap();
        db.record_topic_message(&early, &[bob.clone()]).unwrap();

        let pending = db.read_undelivered_messages(&bob).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], StoredMessage::Topic(early));
        assert_eq!(pending[1], StoredMessage::Direct(late));
    }

    #[test]
    fn test_mark_unknown_uuid_is_noop() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db
            .mark_p2p_delivered(Uuid::new_v4(), &ClientId::from("bob"))
            .unwrap());
    }
}
