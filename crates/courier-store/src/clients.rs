//! Client location (the directory view of sessions) and relationship graph.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use courier_shared::{ClientId, NodeAddr};

use crate::database::Database;
use crate::error::Result;
use crate::models::{from_column, to_column, ClientLocation};

impl Database {
    // ------------------------------------------------------------------
    // Location
    // ------------------------------------------------------------------

    pub fn get_client_location(&self, client: &ClientId) -> Result<Option<ClientLocation>> {
        let location = self
            .conn()
            .query_row(
                "SELECT client_id, node_addr, alive, updated_at
                 FROM clients WHERE client_id = ?1",
                params![client.as_str()],
                |row| {
                    let client_id: String = row.get(0)?;
                    let node: String = row.get(1)?;
                    let updated: String = row.get(3)?;
                    Ok(ClientLocation {
                        client: ClientId::new(client_id),
                        node: NodeAddr::new(node),
                        alive: row.get(2)?,
                        updated_at: from_column(3, &updated)?,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    /// Record that `client` is owned by `node`.
    pub fn upsert_client_session(
        &self,
        client: &ClientId,
        node: &NodeAddr,
        alive: bool,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO clients (client_id, node_addr, alive, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(client_id) DO UPDATE SET
                 node_addr = excluded.node_addr,
                 alive = excluded.alive,
                 updated_at = excluded.updated_at",
            params![
                client.as_str(),
                node.as_str(),
                alive,
                to_column(&Utc::now())
            ],
        )?;
        Ok(())
    }

    /// Mark `client` offline, but only while `node` is still its recorded
    /// owner. A node evicting a stale session must not clobber the claim of
    /// the node the client moved to.
    pub fn set_client_offline(&self, client: &ClientId, node: &NodeAddr) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE clients SET alive = 0, updated_at = ?3
             WHERE client_id = ?1 AND node_addr = ?2",
            params![client.as_str(), node.as_str(), to_column(&Utc::now())],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    pub fn get_friends(&self, client: &ClientId) -> Result<Vec<ClientId>> {
        let mut stmt = self.conn().prepare(
            "SELECT friend_id FROM friends WHERE client_id = ?1 ORDER BY friend_id ASC",
        )?;
        let rows = stmt.query_map(params![client.as_str()], |row| {
            row.get::<_, String>(0).map(ClientId::new)
        })?;

        let mut friends = Vec::new();
        for row in rows {
            friends.push(row?);
        }
        Ok(friends)
    }

    pub fn are_friends(&self, a: &ClientId, b: &ClientId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM friends WHERE client_id = ?1 AND friend_id = ?2",
                params![a.as_str(), b.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Remove the relationship in both directions.
    pub fn remove_friendship(&mut self, a: &ClientId, b: &ClientId) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;
        let mut affected = 0;
        affected += tx.execute(
            "DELETE FROM friends WHERE client_id = ?1 AND friend_id = ?2",
            params![a.as_str(), b.as_str()],
        )?;
        affected += tx.execute(
            "DELETE FROM friends WHERE client_id = ?1 AND friend_id = ?2",
            params![b.as_str(), a.as_str()],
        )?;
        tx.commit()?;
        Ok(affected > 0)
    }
}

/// Insert the relationship in both directions. Runs inside the caller's
/// transaction so that either both sides change or neither does.
pub(crate) fn add_friendship(conn: &Connection, a: &ClientId, b: &ClientId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO friends (client_id, friend_id) VALUES (?1, ?2)",
        params![a.as_str(), b.as_str()],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO friends (client_id, friend_id) VALUES (?1, ?2)",
        params![b.as_str(), a.as_str()],
    )?;
    Ok(())
}
