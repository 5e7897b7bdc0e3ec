//! [`SqliteStore`], the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, params, params_from_iter, types::Value};
use uuid::Uuid;

use quire_core::{
  document::{Document, NewDocument},
  embedding::{Embedding, NewEmbedding, ScoredChunk, SimilarityQuery, rank},
  folder::{Folder, NewFolder, join_path},
  permission::{NewPermission, Permission},
  store::{DocumentStore, FolderStats},
  user::User,
};

use crate::{
  Error, Result,
  encode::{
    DOCUMENT_COLUMNS, EMBEDDING_COLUMNS, FOLDER_COLUMNS, PERMISSION_COLUMNS,
    RawCandidate, RawDocument, RawEmbedding, RawFolder, RawPermission, RawUser,
    USER_COLUMNS, encode_dt, encode_uuid, encode_vector,
  },
  error::is_unique_violation,
  schema::SCHEMA,
};

/// Upper bound on the ancestry walk; a deeper chain can only be a cycle.
const MAX_FOLDER_DEPTH: i64 = 1024;

/// `?, ?, ?` with `n` anonymous placeholders.
fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Quire document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_folders(&self, sql: String, args: Vec<Value>) -> Result<Vec<Folder>> {
    let raws: Vec<RawFolder> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawFolder::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFolder::into_folder).collect()
  }

  async fn query_permissions(&self, sql: String, arg: String) -> Result<Vec<Permission>> {
    let raws: Vec<RawPermission> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![arg], RawPermission::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPermission::into_permission).collect()
  }

  async fn query_documents(&self, sql: String, args: Vec<Value>) -> Result<Vec<Document>> {
    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawDocument::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn query_user(&self, sql: String, arg: String) -> Result<Option<User>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&sql, params![arg], RawUser::from_row).optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn add_user(&self, username: String, is_superuser: bool) -> Result<User> {
    let user = User {
      user_id: Uuid::new_v4(),
      username,
      is_superuser,
      created_at: Utc::now(),
    };

    let id_str   = encode_uuid(user.user_id);
    let name     = user.username.clone();
    let at_str   = encode_dt(user.created_at);

    let res = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, username, is_superuser, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![id_str, name, is_superuser, at_str],
        )?;
        Ok(())
      })
      .await;

    match res {
      Ok(()) => Ok(user),
      Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
        "username {:?} is already taken",
        user.username
      ))),
      Err(e) => Err(e.into()),
    }
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    self
      .query_user(
        format!("SELECT {USER_COLUMNS} FROM users u WHERE u.user_id = ?1"),
        encode_uuid(id),
      )
      .await
  }

  async fn get_user_by_username(&self, username: String) -> Result<Option<User>> {
    self
      .query_user(
        format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1"),
        username,
      )
      .await
  }

  // ── Folders ───────────────────────────────────────────────────────────────

  async fn create_folder(&self, input: NewFolder) -> Result<Folder> {
    let now = Utc::now();
    let folder = Folder {
      folder_id:  Uuid::new_v4(),
      name:       input.name,
      parent_id:  input.parent_id,
      owner_id:   input.owner_id,
      path:       input.path,
      created_at: now,
      updated_at: now,
    };

    let id_str     = encode_uuid(folder.folder_id);
    let name       = folder.name.clone();
    let parent_str = folder.parent_id.map(encode_uuid);
    let owner_str  = encode_uuid(folder.owner_id);
    let path       = folder.path.clone();
    let at_str     = encode_dt(now);

    let res = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO folders (
             folder_id, name, parent_id, owner_id, path, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          params![id_str, name, parent_str, owner_str, path, at_str],
        )?;
        Ok(())
      })
      .await;

    match res {
      Ok(()) => Ok(folder),
      Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
        "a folder named {:?} already exists here",
        folder.name
      ))),
      Err(e) => Err(e.into()),
    }
  }

  async fn get_folder(&self, id: Uuid) -> Result<Option<Folder>> {
    let mut found = self
      .query_folders(
        format!("SELECT {FOLDER_COLUMNS} FROM folders f WHERE f.folder_id = ?"),
        vec![Value::Text(encode_uuid(id))],
      )
      .await?;
    Ok(found.pop())
  }

  async fn list_folders(&self) -> Result<Vec<Folder>> {
    self
      .query_folders(
        format!("SELECT {FOLDER_COLUMNS} FROM folders f ORDER BY f.path"),
        Vec::new(),
      )
      .await
  }

  async fn list_owned_folders(&self, owner_id: Uuid) -> Result<Vec<Folder>> {
    self
      .query_folders(
        format!(
          "SELECT {FOLDER_COLUMNS} FROM folders f WHERE f.owner_id = ? ORDER BY f.path"
        ),
        vec![Value::Text(encode_uuid(owner_id))],
      )
      .await
  }

  async fn get_folders(&self, ids: Vec<Uuid>) -> Result<Vec<Folder>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT {FOLDER_COLUMNS} FROM folders f WHERE f.folder_id IN ({})",
      placeholders(ids.len())
    );
    let args = ids.into_iter().map(|id| Value::Text(encode_uuid(id))).collect();
    self.query_folders(sql, args).await
  }

  async fn folder_ancestry(&self, id: Uuid) -> Result<Vec<Folder>> {
    let sql = format!(
      "WITH RECURSIVE chain(id, depth) AS (
         SELECT ?, 0
         UNION ALL
         SELECT f.parent_id, c.depth + 1
         FROM folders f JOIN chain c ON f.folder_id = c.id
         WHERE f.parent_id IS NOT NULL AND c.depth < ?
       )
       SELECT {FOLDER_COLUMNS}
       FROM chain c JOIN folders f ON f.folder_id = c.id
       ORDER BY c.depth"
    );
    self
      .query_folders(sql, vec![
        Value::Text(encode_uuid(id)),
        Value::Integer(MAX_FOLDER_DEPTH),
      ])
      .await
  }

  async fn rename_folder(&self, id: Uuid, name: String) -> Result<Folder> {
    let id_str  = encode_uuid(id);
    let new_name = name.clone();
    let now_str = encode_dt(Utc::now());

    let res = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(mut raw) = tx
          .query_row(
            &format!("SELECT {FOLDER_COLUMNS} FROM folders f WHERE f.folder_id = ?1"),
            params![id_str],
            RawFolder::from_row,
          )
          .optional()?
        else {
          return Ok(None);
        };

        let parent_path: Option<String> = match &raw.parent_id {
          Some(pid) => Some(tx.query_row(
            "SELECT path FROM folders WHERE folder_id = ?1",
            params![pid],
            |r| r.get(0),
          )?),
          None => None,
        };
        let new_path = join_path(parent_path.as_deref(), &new_name);
        let old_len = raw.path.chars().count() as i64;

        tx.execute(
          "UPDATE folders SET name = ?1, path = ?2, updated_at = ?3 WHERE folder_id = ?4",
          params![new_name, new_path, now_str, id_str],
        )?;

        // Every descendant keeps its suffix below the renamed folder.
        tx.execute(
          "UPDATE folders SET path = ?1 || substr(path, ?2)
           WHERE folder_id IN (
             WITH RECURSIVE sub(id) AS (
               SELECT folder_id FROM folders WHERE parent_id = ?3
               UNION
               SELECT f.folder_id FROM folders f JOIN sub ON f.parent_id = sub.id
             )
             SELECT id FROM sub
           )",
          params![new_path, old_len + 1, id_str],
        )?;

        tx.commit()?;

        raw.name = new_name;
        raw.path = new_path;
        raw.updated_at = now_str;
        Ok(Some(raw))
      })
      .await;

    match res {
      Ok(Some(raw)) => raw.into_folder(),
      Ok(None) => Err(Error::FolderNotFound(id)),
      Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
        "a folder named {name:?} already exists here"
      ))),
      Err(e) => Err(e.into()),
    }
  }

  async fn delete_folder(&self, id: Uuid) -> Result<Vec<Document>> {
    let id_str = encode_uuid(id);

    let raws: Option<Vec<RawDocument>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM folders WHERE folder_id = ?1",
            params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(None);
        }

        let docs = {
          let mut stmt = tx.prepare(&format!(
            "WITH RECURSIVE subtree(id) AS (
               SELECT ?1
               UNION
               SELECT f.folder_id FROM folders f JOIN subtree s ON f.parent_id = s.id
             )
             SELECT {DOCUMENT_COLUMNS} FROM documents d
             WHERE d.folder_id IN (SELECT id FROM subtree)"
          ))?;
          stmt
            .query_map(params![id_str], RawDocument::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        // Descendants, documents, embeddings and grants go via ON DELETE CASCADE.
        tx.execute("DELETE FROM folders WHERE folder_id = ?1", params![id_str])?;
        tx.commit()?;
        Ok(Some(docs))
      })
      .await?;

    raws
      .ok_or(Error::FolderNotFound(id))?
      .into_iter()
      .map(RawDocument::into_document)
      .collect()
  }

  async fn folder_stats(&self, id: Uuid) -> Result<FolderStats> {
    let id_str = encode_uuid(id);

    let (documents, embeddings): (i64, i64) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM documents WHERE folder_id = ?1),
             (SELECT COUNT(*) FROM embeddings e
                JOIN documents d ON d.document_id = e.document_id
              WHERE d.folder_id = ?1)",
          params![id_str],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
      })
      .await?;

    Ok(FolderStats {
      document_count:  usize::try_from(documents).unwrap_or_default(),
      embedding_count: usize::try_from(embeddings).unwrap_or_default(),
    })
  }

  // ── Permissions ───────────────────────────────────────────────────────────

  async fn upsert_permission(&self, input: NewPermission) -> Result<Permission> {
    let new_id_str  = encode_uuid(Uuid::new_v4());
    let user_str    = encode_uuid(input.user_id);
    let folder_str  = encode_uuid(input.folder_id);
    let granter_str = encode_uuid(input.granted_by);
    let now_str     = encode_dt(Utc::now());
    let flags       = input.flags;

    let raw: RawPermission = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO permissions (
             permission_id, user_id, folder_id,
             can_read, can_write, can_delete, is_admin,
             granted_by, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
           ON CONFLICT (user_id, folder_id) DO UPDATE SET
             can_read   = excluded.can_read,
             can_write  = excluded.can_write,
             can_delete = excluded.can_delete,
             is_admin   = excluded.is_admin,
             granted_by = excluded.granted_by,
             updated_at = excluded.updated_at",
          params![
            new_id_str,
            user_str,
            folder_str,
            flags.can_read,
            flags.can_write,
            flags.can_delete,
            flags.is_admin,
            granter_str,
            now_str,
          ],
        )?;
        let row = tx.query_row(
          &format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p
             WHERE p.user_id = ?1 AND p.folder_id = ?2"
          ),
          params![user_str, folder_str],
          RawPermission::from_row,
        )?;
        tx.commit()?;
        Ok(row)
      })
      .await?;

    raw.into_permission()
  }

  async fn get_permission(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
  ) -> Result<Option<Permission>> {
    let user_str   = encode_uuid(user_id);
    let folder_str = encode_uuid(folder_id);

    let raw: Option<RawPermission> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PERMISSION_COLUMNS} FROM permissions p
                 WHERE p.user_id = ?1 AND p.folder_id = ?2"
              ),
              params![user_str, folder_str],
              RawPermission::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPermission::into_permission).transpose()
  }

  async fn delete_permission(&self, user_id: Uuid, folder_id: Uuid) -> Result<bool> {
    let user_str   = encode_uuid(user_id);
    let folder_str = encode_uuid(folder_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM permissions WHERE user_id = ?1 AND folder_id = ?2",
          params![user_str, folder_str],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  async fn list_folder_permissions(&self, folder_id: Uuid) -> Result<Vec<Permission>> {
    self
      .query_permissions(
        format!(
          "SELECT {PERMISSION_COLUMNS} FROM permissions p
           WHERE p.folder_id = ?1 ORDER BY p.created_at"
        ),
        encode_uuid(folder_id),
      )
      .await
  }

  async fn list_user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>> {
    self
      .query_permissions(
        format!(
          "SELECT {PERMISSION_COLUMNS} FROM permissions p
           WHERE p.user_id = ?1 ORDER BY p.created_at"
        ),
        encode_uuid(user_id),
      )
      .await
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn create_document(&self, input: NewDocument) -> Result<Document> {
    let doc = Document {
      document_id: input.document_id,
      folder_id:   input.folder_id,
      filename:    input.filename,
      file_type:   input.file_type,
      file_size:   input.file_size,
      storage_key: input.storage_key,
      metadata:    input.metadata,
      uploaded_by: Some(input.uploaded_by),
      created_at:  Utc::now(),
    };

    let id_str       = encode_uuid(doc.document_id);
    let folder_str   = encode_uuid(doc.folder_id);
    let filename     = doc.filename.clone();
    let file_type    = doc.file_type.clone();
    let file_size    = i64::try_from(doc.file_size).unwrap_or(i64::MAX);
    let storage_key  = doc.storage_key.clone();
    let metadata_str = serde_json::to_string(&doc.metadata)?;
    let uploader_str = encode_uuid(input.uploaded_by);
    let at_str       = encode_dt(doc.created_at);

    let res = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (
             document_id, folder_id, filename, file_type, file_size,
             storage_key, metadata, uploaded_by, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          params![
            id_str,
            folder_str,
            filename,
            file_type,
            file_size,
            storage_key,
            metadata_str,
            uploader_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await;

    match res {
      Ok(()) => Ok(doc),
      Err(e) if is_unique_violation(&e) => Err(Error::DuplicateDocument(doc.filename)),
      Err(e) => Err(e.into()),
    }
  }

  async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
    let mut found = self
      .query_documents(
        format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.document_id = ?"),
        vec![Value::Text(encode_uuid(id))],
      )
      .await?;
    Ok(found.pop())
  }

  async fn list_documents(&self, folder_id: Uuid) -> Result<Vec<Document>> {
    self
      .query_documents(
        format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents d
           WHERE d.folder_id = ? ORDER BY d.filename"
        ),
        vec![Value::Text(encode_uuid(folder_id))],
      )
      .await
  }

  async fn list_documents_in(
    &self,
    folder_ids: Vec<Uuid>,
    limit: usize,
  ) -> Result<Vec<Document>> {
    if folder_ids.is_empty() || limit == 0 {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT {DOCUMENT_COLUMNS} FROM documents d
       WHERE d.folder_id IN ({})
       ORDER BY d.created_at DESC
       LIMIT ?",
      placeholders(folder_ids.len())
    );
    let mut args: Vec<Value> = folder_ids
      .into_iter()
      .map(|id| Value::Text(encode_uuid(id)))
      .collect();
    args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    self.query_documents(sql, args).await
  }

  async fn delete_document(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM documents WHERE document_id = ?1", params![id_str])?)
      })
      .await?;

    Ok(removed > 0)
  }

  // ── Embeddings ────────────────────────────────────────────────────────────

  async fn replace_embeddings(
    &self,
    document_id: Uuid,
    chunks: Vec<NewEmbedding>,
  ) -> Result<Vec<Embedding>> {
    let now = Utc::now();
    let embeddings: Vec<Embedding> = chunks
      .into_iter()
      .enumerate()
      .map(|(i, c)| Embedding {
        embedding_id: Uuid::new_v4(),
        document_id,
        chunk_index: u32::try_from(i).unwrap_or(u32::MAX),
        chunk_text: c.chunk_text,
        vector: c.vector,
        metadata: c.metadata,
        created_at: now,
      })
      .collect();

    let rows = embeddings
      .iter()
      .map(|e| {
        Ok((
          encode_uuid(e.embedding_id),
          i64::from(e.chunk_index),
          e.chunk_text.clone(),
          encode_vector(&e.vector),
          serde_json::to_string(&e.metadata)?,
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    let doc_str = encode_uuid(document_id);
    let at_str  = encode_dt(now);

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM documents WHERE document_id = ?1",
            params![doc_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(false);
        }

        tx.execute("DELETE FROM embeddings WHERE document_id = ?1", params![doc_str])?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO embeddings (
               embedding_id, document_id, chunk_index, chunk_text,
               vector, metadata, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          )?;
          for (id, index, text, vector, metadata) in rows {
            stmt.execute(params![id, doc_str, index, text, vector, metadata, at_str])?;
          }
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::DocumentNotFound(document_id));
    }
    Ok(embeddings)
  }

  async fn list_embeddings(&self, document_id: Uuid) -> Result<Vec<Embedding>> {
    let doc_str = encode_uuid(document_id);

    let raws: Vec<RawEmbedding> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EMBEDDING_COLUMNS} FROM embeddings e
           WHERE e.document_id = ?1 ORDER BY e.chunk_index"
        ))?;
        let rows = stmt
          .query_map(params![doc_str], RawEmbedding::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEmbedding::into_embedding).collect()
  }

  /// Exact nearest-neighbour search. SQLite has no vector index, so every
  /// chunk in the allowed folders is loaded and scored in process: cost is
  /// linear in the number of chunks the caller can see, and a superuser
  /// query scans the whole `embeddings` table.
  async fn search_similar(&self, query: &SimilarityQuery) -> Result<Vec<ScoredChunk>> {
    if query.folder_ids.is_empty() {
      tracing::debug!("empty folder allow-list; skipping similarity search");
      return Ok(Vec::new());
    }

    // The allow-list is bound as parameters, never formatted into the SQL.
    let sql = format!(
      "SELECT {EMBEDDING_COLUMNS}, d.filename, f.folder_id, f.name
       FROM embeddings e
       JOIN documents d ON d.document_id = e.document_id
       JOIN folders   f ON f.folder_id   = d.folder_id
       WHERE d.folder_id IN ({})
       ORDER BY d.created_at, e.document_id, e.chunk_index",
      placeholders(query.folder_ids.len())
    );
    let args: Vec<String> = query.folder_ids.iter().copied().map(encode_uuid).collect();

    let raws: Vec<RawCandidate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawCandidate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let candidates = raws
      .into_iter()
      .map(RawCandidate::into_candidate)
      .collect::<Result<Vec<_>>>()?;

    Ok(rank(query, candidates))
  }
}
