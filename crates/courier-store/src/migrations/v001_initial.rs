//! v001 -- Initial schema creation.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Clients and where they are connected
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS clients (
    client_id  TEXT PRIMARY KEY NOT NULL,
    node_addr  TEXT NOT NULL,             -- owning node of the last session
    alive      INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL              -- RFC-3339
);

-- Relationship graph, one row per direction.
CREATE TABLE IF NOT EXISTS friends (
    client_id TEXT NOT NULL,
    friend_id TEXT NOT NULL,
    PRIMARY KEY (client_id, friend_id)
);

-- ----------------------------------------------------------------
-- Topics
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS topics (
    topic_id   TEXT PRIMARY KEY NOT NULL,
    founder_id TEXT NOT NULL,
    node_addr  TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topic_members (
    topic_id  TEXT NOT NULL,
    client_id TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (topic_id, client_id),
    FOREIGN KEY (topic_id) REFERENCES topics(topic_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_topic_members_client ON topic_members(client_id);

-- ----------------------------------------------------------------
-- Message history
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS p2p_messages (
    uuid      TEXT PRIMARY KEY NOT NULL,
    from_id   TEXT NOT NULL,
    to_id     TEXT NOT NULL,
    content   TEXT NOT NULL,
    sent_at   TEXT NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_p2p_undelivered ON p2p_messages(to_id, delivered, sent_at);

CREATE TABLE IF NOT EXISTS topic_messages (
    uuid     TEXT PRIMARY KEY NOT NULL,
    topic_id TEXT NOT NULL,
    from_id  TEXT NOT NULL,
    content  TEXT NOT NULL,
    sent_at  TEXT NOT NULL
);

-- One row per recipient: each acknowledges independently.
CREATE TABLE IF NOT EXISTS topic_deliveries (
    uuid         TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    delivered    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (uuid, recipient_id),
    FOREIGN KEY (uuid) REFERENCES topic_messages(uuid) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_topic_deliveries_recipient
    ON topic_deliveries(recipient_id, delivered);

-- ----------------------------------------------------------------
-- Mutual (friend / invite) requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS mutual_requests (
    uuid       TEXT PRIMARY KEY NOT NULL,
    from_id    TEXT NOT NULL,
    to_id      TEXT NOT NULL,
    kind       TEXT NOT NULL,
    topic_id   TEXT,
    created_at TEXT NOT NULL,
    is_read    INTEGER NOT NULL DEFAULT 0,
    resolved   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_mutual_pending ON mutual_requests(to_id, resolved, created_at);

-- ----------------------------------------------------------------
-- Node directory
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS nodes (
    node_addr   TEXT PRIMARY KEY NOT NULL,
    name        TEXT NOT NULL,
    cpus        INTEGER NOT NULL,
    sessions    INTEGER NOT NULL,
    last_seen   TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
