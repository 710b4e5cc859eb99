//! CRUD operations for topics and their membership.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use courier_shared::{ClientId, NodeAddr, TopicId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{from_column, to_column, TopicMember, TopicRecord};

impl Database {
    /// Create a topic with its founder as first member. Returns `false` when
    /// the topic already exists.
    pub fn create_topic(&mut self, topic: &TopicRecord) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO topics (topic_id, founder_id, node_addr, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                topic.topic.as_str(),
                topic.founder.as_str(),
                topic.node.as_str(),
                to_column(&topic.created_at),
            ],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        add_member(&tx, &topic.topic, &topic.founder)?;
        tx.commit()?;
        Ok(true)
    }

    pub fn get_topic(&self, topic: &TopicId) -> Result<Option<TopicRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT topic_id, founder_id, node_addr, created_at
                 FROM topics WHERE topic_id = ?1",
                params![topic.as_str()],
                |row| {
                    let topic_id: String = row.get(0)?;
                    let founder: String = row.get(1)?;
                    let node: String = row.get(2)?;
                    let created: String = row.get(3)?;
                    Ok(TopicRecord {
                        topic: TopicId::new(topic_id),
                        founder: ClientId::new(founder),
                        node: NodeAddr::new(node),
                        created_at: from_column(3, &created)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn add_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool> {
        add_member(self.conn(), topic, client)
    }

    pub fn remove_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM topic_members WHERE topic_id = ?1 AND client_id = ?2",
            params![topic.as_str(), client.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn is_topic_member(&self, topic: &TopicId, client: &ClientId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM topic_members WHERE topic_id = ?1 AND client_id = ?2",
                params![topic.as_str(), client.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Members of `topic` with their owning node, or `None` when the topic
    /// does not exist.
    pub fn get_topic_members(&self, topic: &TopicId) -> Result<Option<Vec<TopicMember>>> {
        if self.get_topic(topic)?.is_none() {
            return Ok(None);
        }

        let mut stmt = self.conn().prepare(
            "SELECT m.client_id, c.node_addr, COALESCE(c.alive, 0)
             FROM topic_members m
             LEFT JOIN clients c ON c.client_id = m.client_id
             WHERE m.topic_id = ?1
             ORDER BY m.client_id ASC",
        )?;
        let rows = stmt.query_map(params![topic.as_str()], |row| {
            let client: String = row.get(0)?;
            let node: Option<String> = row.get(1)?;
            Ok(TopicMember {
                client: ClientId::new(client),
                node: node.map(NodeAddr::new),
                alive: row.get(2)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(Some(members))
    }

    pub fn topics_for_client(&self, client: &ClientId) -> Result<Vec<TopicId>> {
        let mut stmt = self.conn().prepare(
            "SELECT topic_id FROM topic_members WHERE client_id = ?1 ORDER BY topic_id ASC",
        )?;
        let rows = stmt.query_map(params![client.as_str()], |row| {
            row.get::<_, String>(0).map(TopicId::new)
        })?;

        let mut topics = Vec::new();
        for row in rows {
            topics.push(row?);
        }
        Ok(topics)
    }
}

pub(crate) fn add_member(conn: &Connection, topic: &TopicId, client: &ClientId) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO topic_members (topic_id, client_id, joined_at)
         VALUES (?1, ?2, ?3)",
        params![topic.as_str(), client.as_str(), to_column(&Utc::now())],
    )?;
    Ok(affected > 0)
}
