//! Node directory: self-registration records with a freshness window.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use courier_shared::NodeAddr;

use crate::database::Database;
use crate::error::Result;
use crate::models::{from_column, to_column, NodeInfo};

impl Database {
    pub fn register_node(&self, info: &NodeInfo) -> Result<()> {
        self.conn().execute(
            "INSERT INTO nodes (node_addr, name, cpus, sessions, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(node_addr) DO UPDATE SET
                 name = excluded.name,
                 cpus = excluded.cpus,
                 sessions = excluded.sessions,
                 last_seen = excluded.last_seen",
            params![
                info.addr.as_str(),
                info.name,
                info.cpus,
                info.sessions as i64,
                to_column(&info.last_seen),
            ],
        )?;
        Ok(())
    }

    pub fn get_node(&self, addr: &NodeAddr) -> Result<Option<NodeInfo>> {
        let info = self
            .conn()
            .query_row(
                "SELECT node_addr, name, cpus, sessions, last_seen FROM nodes WHERE node_addr = ?1",
                params![addr.as_str()],
                row_to_node,
            )
            .optional()?;
        Ok(info)
    }

    pub fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let mut stmt = self.conn().prepare(
            "SELECT node_addr, name, cpus, sessions, last_seen FROM nodes ORDER BY node_addr ASC",
        )?;
        let rows = stmt.query_map([], row_to_node)?;

        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    /// A node is reachable when it registered itself within `ttl` of `now`.
    pub fn node_is_reachable(
        &self,
        addr: &NodeAddr,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .get_node(addr)?
            .map(|info| now - info.last_seen <= ttl)
            .unwrap_or(false))
    }
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeInfo> {
    let addr: String = row.get(0)?;
    let sessions: i64 = row.get(3)?;
    let last_seen: String = row.get(4)?;
    Ok(NodeInfo {
        addr: NodeAddr::new(addr),
        name: row.get(1)?,
        cpus: row.get(2)?,
        sessions: sessions.max(0) as u64,
        last_seen: from_column(4, &last_seen)?,
    })
}
