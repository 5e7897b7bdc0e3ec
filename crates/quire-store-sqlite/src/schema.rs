//! SQL schema for the Quire SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id      TEXT PRIMARY KEY,
    username     TEXT NOT NULL UNIQUE,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS folders (
    folder_id  TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    parent_id  TEXT REFERENCES folders(folder_id) ON DELETE CASCADE,
    owner_id   TEXT NOT NULL REFERENCES users(user_id),
    path       TEXT NOT NULL,   -- materialised {parent.path}/{name}
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (parent_id, name)
);

-- NULL parent_id never collides under UNIQUE, so roots need their own index.
CREATE UNIQUE INDEX IF NOT EXISTS folders_root_name_idx
    ON folders(owner_id, name) WHERE parent_id IS NULL;

CREATE TABLE IF NOT EXISTS permissions (
    permission_id TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    folder_id     TEXT NOT NULL REFERENCES folders(folder_id) ON DELETE CASCADE,
    can_read      INTEGER NOT NULL DEFAULT 0,
    can_write     INTEGER NOT NULL DEFAULT 0,
    can_delete    INTEGER NOT NULL DEFAULT 0,
    is_admin      INTEGER NOT NULL DEFAULT 0,
    granted_by    TEXT REFERENCES users(user_id) ON DELETE SET NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (user_id, folder_id)
);

CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,
    folder_id   TEXT NOT NULL REFERENCES folders(folder_id) ON DELETE CASCADE,
    filename    TEXT NOT NULL,
    file_type   TEXT NOT NULL,
    file_size   INTEGER NOT NULL,
    storage_key TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    uploaded_by TEXT REFERENCES users(user_id) ON DELETE SET NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (folder_id, filename)
);

CREATE TABLE IF NOT EXISTS embeddings (
    embedding_id TEXT PRIMARY KEY,
    document_id  TEXT NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
    chunk_index  INTEGER NOT NULL,
    chunk_text   TEXT NOT NULL,
    vector       BLOB NOT NULL,  -- little-endian f32
    metadata     TEXT NOT NULL DEFAULT '{}',
    created_at   TEXT NOT NULL,
    UNIQUE (document_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS folders_parent_idx      ON folders(parent_id);
CREATE INDEX IF NOT EXISTS folders_owner_idx       ON folders(owner_id);
CREATE INDEX IF NOT EXISTS permissions_user_idx    ON permissions(user_id);
CREATE INDEX IF NOT EXISTS documents_folder_idx    ON documents(folder_id);
CREATE INDEX IF NOT EXISTS embeddings_document_idx ON embeddings(document_id);

PRAGMA user_version = 1;
";
