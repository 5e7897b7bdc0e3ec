//! Integration tests for `SqliteStore` and the access rules over it, against
//! an in-memory database.

use std::{collections::HashSet, sync::Arc};

use quire_core::{
  Error as CoreError,
  access::{AccessControl, Scope},
  document::{NewDocument, storage_key},
  embedding::{NewEmbedding, SimilarityQuery},
  folder::{Folder, NewFolder, child_path},
  folders::FolderService,
  permission::{Capability, NewPermission, PermissionFlags},
  store::DocumentStore,
  user::User,
};
use rand_core::{OsRng, RngCore};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn user(s: &SqliteStore, name: &str) -> User {
  s.add_user(name.into(), false).await.unwrap()
}

async fn folder(s: &SqliteStore, owner: &User, name: &str, parent: Option<&Folder>) -> Folder {
  s.create_folder(NewFolder {
    name:      name.into(),
    parent_id: parent.map(|p| p.folder_id),
    owner_id:  owner.user_id,
    path:      child_path(parent, name),
  })
  .await
  .unwrap()
}

async fn document(s: &SqliteStore, owner: &User, folder: &Folder, filename: &str) -> Uuid {
  let document_id = Uuid::new_v4();
  s.create_document(NewDocument {
    document_id,
    folder_id: folder.folder_id,
    filename: filename.into(),
    file_type: "txt".into(),
    file_size: 10,
    storage_key: storage_key(document_id, filename),
    metadata: serde_json::json!({}),
    uploaded_by: owner.user_id,
  })
  .await
  .unwrap();
  document_id
}

fn chunk(text: &str, vector: Vec<f32>) -> NewEmbedding {
  NewEmbedding {
    chunk_text: text.into(),
    vector,
    metadata: serde_json::json!({}),
  }
}

async fn grant_raw(s: &SqliteStore, to: &User, on: &Folder, flags: PermissionFlags, by: &User) {
  s.upsert_permission(NewPermission {
    user_id: to.user_id,
    folder_id: on.folder_id,
    flags,
    granted_by: by.user_id,
  })
  .await
  .unwrap();
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_user() {
  let s = store().await;
  let alice = s.add_user("alice".into(), true).await.unwrap();

  let by_id = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(by_id, alice);
  let by_name = s.get_user_by_username("alice".into()).await.unwrap().unwrap();
  assert!(by_name.is_superuser);
  assert!(s.get_user(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_username_conflicts() {
  let s = store().await;
  user(&s, "alice").await;
  let err = s.add_user("alice".into(), false).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
}

// ─── Folders ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sibling_names_are_unique() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let root = folder(&s, &alice, "finance", None).await;
  folder(&s, &alice, "2024", Some(&root)).await;

  let err = s
    .create_folder(NewFolder {
      name:      "2024".into(),
      parent_id: Some(root.folder_id),
      owner_id:  alice.user_id,
      path:      child_path(Some(&root), "2024"),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
  assert!(matches!(CoreError::from(err), CoreError::Conflict(_)));
}

#[tokio::test]
async fn root_names_are_unique_per_owner() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  folder(&s, &alice, "shared", None).await;
  folder(&s, &bob, "shared", None).await;

  let err = s
    .create_folder(NewFolder {
      name:      "shared".into(),
      parent_id: None,
      owner_id:  alice.user_id,
      path:      "/shared".into(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn ancestry_is_leaf_first() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let a = folder(&s, &alice, "a", None).await;
  let b = folder(&s, &alice, "b", Some(&a)).await;
  let c = folder(&s, &alice, "c", Some(&b)).await;

  let chain: Vec<Uuid> = s
    .folder_ancestry(c.folder_id)
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.folder_id)
    .collect();
  assert_eq!(chain, [c.folder_id, b.folder_id, a.folder_id]);
  assert!(s.folder_ancestry(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn rename_rewrites_descendant_paths() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let a = folder(&s, &alice, "a", None).await;
  let b = folder(&s, &alice, "b", Some(&a)).await;
  let c = folder(&s, &alice, "c", Some(&b)).await;
  let other = folder(&s, &alice, "ab", None).await;

  let renamed = s.rename_folder(a.folder_id, "archive".into()).await.unwrap();
  assert_eq!(renamed.path, "/archive");
  assert_eq!(s.get_folder(b.folder_id).await.unwrap().unwrap().path, "/archive/b");
  assert_eq!(s.get_folder(c.folder_id).await.unwrap().unwrap().path, "/archive/b/c");
  assert_eq!(s.get_folder(other.folder_id).await.unwrap().unwrap().path, "/ab");
}

#[tokio::test]
async fn rename_onto_sibling_conflicts() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let root = folder(&s, &alice, "root", None).await;
  let x = folder(&s, &alice, "x", Some(&root)).await;
  folder(&s, &alice, "y", Some(&root)).await;

  let err = s.rename_folder(x.folder_id, "y".into()).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
  assert_eq!(s.get_folder(x.folder_id).await.unwrap().unwrap().name, "x");
}

#[tokio::test]
async fn delete_folder_cascades_downward() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let root = folder(&s, &alice, "root", None).await;
  let child = folder(&s, &alice, "child", Some(&root)).await;
  let keep = folder(&s, &alice, "keep", None).await;

  let d1 = document(&s, &alice, &root, "a.txt").await;
  let d2 = document(&s, &alice, &child, "b.txt").await;
  let d3 = document(&s, &alice, &keep, "c.txt").await;
  s.replace_embeddings(d2, vec![chunk("x", vec![1.0, 0.0])]).await.unwrap();
  grant_raw(&s, &bob, &child, PermissionFlags::READ, &alice).await;

  let removed: HashSet<Uuid> = s
    .delete_folder(root.folder_id)
    .await
    .unwrap()
    .into_iter()
    .map(|d| d.document_id)
    .collect();
  assert_eq!(removed, HashSet::from([d1, d2]));

  assert!(s.get_folder(child.folder_id).await.unwrap().is_none());
  assert!(s.get_document(d2).await.unwrap().is_none());
  assert!(s.list_embeddings(d2).await.unwrap().is_empty());
  assert!(s.list_user_permissions(bob.user_id).await.unwrap().is_empty());
  assert!(s.get_document(d3).await.unwrap().is_some());

  let err = s.delete_folder(root.folder_id).await.unwrap_err();
  assert!(matches!(err, Error::FolderNotFound(_)));
}

#[tokio::test]
async fn folder_stats_count_documents_and_chunks() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let f = folder(&s, &alice, "f", None).await;
  let d = document(&s, &alice, &f, "a.txt").await;
  document(&s, &alice, &f, "b.txt").await;
  s.replace_embeddings(d, vec![chunk("x", vec![1.0]), chunk("y", vec![0.5])])
    .await
    .unwrap();

  let stats = s.folder_stats(f.folder_id).await.unwrap();
  assert_eq!(stats.document_count, 2);
  assert_eq!(stats.embedding_count, 2);
}

// ─── Permissions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_overwrites_in_place() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let f = folder(&s, &alice, "f", None).await;

  grant_raw(&s, &bob, &f, PermissionFlags::READ, &alice).await;
  let first = s.get_permission(bob.user_id, f.folder_id).await.unwrap().unwrap();

  let write = PermissionFlags { can_write: true, ..Default::default() };
  grant_raw(&s, &bob, &f, write, &alice).await;
  let rows = s.list_folder_permissions(f.folder_id).await.unwrap();

  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].permission_id, first.permission_id);
  assert_eq!(rows[0].flags, write);
}

#[tokio::test]
async fn delete_permission_reports_absence() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let f = folder(&s, &alice, "f", None).await;
  grant_raw(&s, &bob, &f, PermissionFlags::READ, &alice).await;

  assert!(s.delete_permission(bob.user_id, f.folder_id).await.unwrap());
  assert!(!s.delete_permission(bob.user_id, f.folder_id).await.unwrap());
}

// ─── Documents and embeddings ────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_filename_is_rejected_per_folder() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let f = folder(&s, &alice, "f", None).await;
  let g = folder(&s, &alice, "g", None).await;
  document(&s, &alice, &f, "report.txt").await;

  let id = Uuid::new_v4();
  let err = s
    .create_document(NewDocument {
      document_id: id,
      folder_id:   f.folder_id,
      filename:    "report.txt".into(),
      file_type:   "txt".into(),
      file_size:   1,
      storage_key: storage_key(id, "report.txt"),
      metadata:    serde_json::json!({}),
      uploaded_by: alice.user_id,
    })
    .await
    .unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::BadRequest(_)));

  // Same name elsewhere is fine.
  document(&s, &alice, &g, "report.txt").await;
}

#[tokio::test]
async fn regeneration_replaces_every_chunk() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let f = folder(&s, &alice, "f", None).await;
  let d = document(&s, &alice, &f, "a.txt").await;

  let old: Vec<_> = (0..5).map(|i| chunk(&format!("old {i}"), vec![1.0, i as f32])).collect();
  s.replace_embeddings(d, old).await.unwrap();

  let new = vec![chunk("new 0", vec![0.0, 1.0]), chunk("new 1", vec![1.0, 1.0])];
  s.replace_embeddings(d, new).await.unwrap();

  let stored = s.list_embeddings(d).await.unwrap();
  assert_eq!(stored.len(), 2);
  let indices: Vec<u32> = stored.iter().map(|e| e.chunk_index).collect();
  assert_eq!(indices, [0, 1]);
  assert!(stored.iter().all(|e| e.chunk_text.starts_with("new")));
  assert_eq!(stored[1].vector, vec![1.0, 1.0]);
}

#[tokio::test]
async fn regeneration_of_missing_document_fails() {
  let s = store().await;
  let err = s
    .replace_embeddings(Uuid::new_v4(), vec![chunk("x", vec![1.0])])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocumentNotFound(_)));
}

#[tokio::test]
async fn search_is_confined_to_allow_list() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let mine = folder(&s, &alice, "mine", None).await;
  let theirs = folder(&s, &alice, "theirs", None).await;
  let d1 = document(&s, &alice, &mine, "a.txt").await;
  let d2 = document(&s, &alice, &theirs, "b.txt").await;
  s.replace_embeddings(d1, vec![chunk("close", vec![1.0, 0.1])]).await.unwrap();
  s.replace_embeddings(d2, vec![chunk("exact", vec![1.0, 0.0])]).await.unwrap();

  let hits = s
    .search_similar(&SimilarityQuery {
      vector:         vec![1.0, 0.0],
      folder_ids:     vec![mine.folder_id],
      limit:          10,
      min_similarity: 0.0,
    })
    .await
    .unwrap();

  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].embedding.chunk_text, "close");
  assert_eq!(hits[0].folder_id, mine.folder_id);
  assert_eq!(hits[0].folder_name, "mine");
  assert_eq!(hits[0].document_name, "a.txt");
}

#[tokio::test]
async fn search_with_empty_allow_list_is_empty() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let f = folder(&s, &alice, "f", None).await;
  let d = document(&s, &alice, &f, "a.txt").await;
  s.replace_embeddings(d, vec![chunk("x", vec![1.0])]).await.unwrap();

  let hits = s
    .search_similar(&SimilarityQuery {
      vector:         vec![1.0],
      folder_ids:     vec![],
      limit:          10,
      min_similarity: -1.0,
    })
    .await
    .unwrap();
  assert!(hits.is_empty());
}

#[tokio::test]
async fn search_applies_threshold() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let f = folder(&s, &alice, "f", None).await;
  let d = document(&s, &alice, &f, "a.txt").await;
  s.replace_embeddings(d, vec![
    chunk("orthogonal", vec![0.0, 1.0]),
    chunk("aligned", vec![2.0, 0.0]),
  ])
  .await
  .unwrap();

  let hits = s
    .search_similar(&SimilarityQuery {
      vector:         vec![1.0, 0.0],
      folder_ids:     vec![f.folder_id],
      limit:          10,
      min_similarity: 0.7,
    })
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert!((hits[0].score - 1.0).abs() < 1e-6);
}

// ─── Access resolution ───────────────────────────────────────────────────────

fn access(s: &SqliteStore) -> AccessControl<SqliteStore> {
  AccessControl::new(Arc::new(s.clone()))
}

#[tokio::test]
async fn owner_holds_every_capability() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let f = folder(&s, &alice, "f", None).await;
  let ac = access(&s);

  for cap in Capability::iter() {
    assert!(ac.check(alice.user_id, f.folder_id, cap).await.unwrap());
  }
}

#[tokio::test]
async fn superuser_holds_every_capability() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let root = s.add_user("root".into(), true).await.unwrap();
  let f = folder(&s, &alice, "f", None).await;
  let ac = access(&s);

  for cap in Capability::iter() {
    assert!(ac.check(root.user_id, f.folder_id, cap).await.unwrap());
  }
  // Superusers short-circuit before the folder lookup.
  assert!(ac.check(root.user_id, Uuid::new_v4(), Capability::Read).await.unwrap());
}

#[tokio::test]
async fn missing_folder_is_not_found_for_check_and_denied_for_check_access() {
  let s = store().await;
  let bob = user(&s, "bob").await;
  let ac = access(&s);
  let ghost = Uuid::new_v4();

  let err = ac.check(bob.user_id, ghost, Capability::Read).await.unwrap_err();
  assert!(matches!(err, CoreError::FolderNotFound(id) if id == ghost));

  let err = ac.check_access(bob.user_id, ghost, Capability::Read).await.unwrap_err();
  assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn grants_flow_down_to_descendants() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let root = folder(&s, &alice, "root", None).await;
  let mid = folder(&s, &alice, "mid", Some(&root)).await;
  let leaf = folder(&s, &alice, "leaf", Some(&mid)).await;
  let ac = access(&s);

  assert!(!ac.check(bob.user_id, leaf.folder_id, Capability::Read).await.unwrap());

  grant_raw(&s, &bob, &root, PermissionFlags::READ, &alice).await;
  assert!(ac.check(bob.user_id, leaf.folder_id, Capability::Read).await.unwrap());
  assert!(!ac.check(bob.user_id, leaf.folder_id, Capability::Write).await.unwrap());

  // A narrower grant lower down never takes inherited access away.
  grant_raw(&s, &bob, &mid, PermissionFlags::default(), &alice).await;
  assert!(ac.check(bob.user_id, leaf.folder_id, Capability::Read).await.unwrap());

  // Inherited access is not enumerated.
  let direct: Vec<Uuid> = ac
    .accessible_folders(bob.user_id)
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.folder_id)
    .collect();
  assert_eq!(direct, [root.folder_id]);

  let widened: HashSet<Uuid> = ac
    .accessible_folders_in(bob.user_id, Scope::WithDescendants)
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.folder_id)
    .collect();
  assert_eq!(widened, HashSet::from([root.folder_id, mid.folder_id, leaf.folder_id]));
}

#[tokio::test]
async fn admin_grant_implies_all_capabilities() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let f = folder(&s, &alice, "f", None).await;
  let admin = PermissionFlags { is_admin: true, ..Default::default() };
  grant_raw(&s, &bob, &f, admin, &alice).await;
  let ac = access(&s);

  for cap in Capability::iter() {
    assert!(ac.check(bob.user_id, f.folder_id, cap).await.unwrap());
  }
  assert_eq!(ac.effective(bob.user_id, f.folder_id).await.unwrap(), PermissionFlags::ALL);
}

#[tokio::test]
async fn enumeration_deduplicates_owned_and_granted() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let shared = folder(&s, &alice, "shared", None).await;
  let own = folder(&s, &bob, "own", None).await;
  let empty = folder(&s, &alice, "empty", None).await;

  grant_raw(&s, &bob, &shared, PermissionFlags::READ, &alice).await;
  grant_raw(&s, &bob, &own, PermissionFlags::READ, &alice).await;
  grant_raw(&s, &bob, &empty, PermissionFlags::default(), &alice).await;

  let ids: Vec<Uuid> = access(&s)
    .accessible_folders(bob.user_id)
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.folder_id)
    .collect();
  assert_eq!(ids, [own.folder_id, shared.folder_id]);
}

#[tokio::test]
async fn superuser_enumerates_everything() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let root = s.add_user("root".into(), true).await.unwrap();
  folder(&s, &alice, "a", None).await;
  folder(&s, &alice, "b", None).await;

  assert_eq!(access(&s).accessible_folders(root.user_id).await.unwrap().len(), 2);
}

// ─── Grant / revoke ──────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_grants_are_idempotent() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let f = folder(&s, &alice, "f", None).await;
  let ac = access(&s);

  ac.grant(alice.user_id, bob.user_id, f.folder_id, PermissionFlags::READ).await.unwrap();
  ac.grant(alice.user_id, bob.user_id, f.folder_id, PermissionFlags::READ).await.unwrap();

  let rows = s.list_folder_permissions(f.folder_id).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].flags, PermissionFlags::READ);
  assert_eq!(rows[0].granted_by, Some(alice.user_id));
}

#[tokio::test]
async fn only_owner_admin_or_superuser_may_grant() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let carol = user(&s, "carol").await;
  let root = s.add_user("root".into(), true).await.unwrap();
  let f = folder(&s, &alice, "f", None).await;
  let ac = access(&s);

  // A plain reader cannot pass access on.
  ac.grant(alice.user_id, bob.user_id, f.folder_id, PermissionFlags::READ).await.unwrap();
  let err = ac
    .grant(bob.user_id, carol.user_id, f.folder_id, PermissionFlags::READ)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::PermissionDenied(_)));

  // An admin can.
  let admin = PermissionFlags { is_admin: true, ..Default::default() };
  ac.grant(root.user_id, bob.user_id, f.folder_id, admin).await.unwrap();
  ac.grant(bob.user_id, carol.user_id, f.folder_id, PermissionFlags::READ).await.unwrap();
  assert!(ac.check(carol.user_id, f.folder_id, Capability::Read).await.unwrap());
}

#[tokio::test]
async fn revoke_removes_access_and_reports_absence() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let f = folder(&s, &alice, "f", None).await;
  let ac = access(&s);

  ac.grant(alice.user_id, bob.user_id, f.folder_id, PermissionFlags::READ).await.unwrap();
  assert!(ac.revoke(alice.user_id, bob.user_id, f.folder_id).await.unwrap());
  assert!(!ac.check(bob.user_id, f.folder_id, Capability::Read).await.unwrap());
  assert!(!ac.revoke(alice.user_id, bob.user_id, f.folder_id).await.unwrap());

  let err = ac.revoke(bob.user_id, alice.user_id, f.folder_id).await.unwrap_err();
  assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn grant_to_unknown_user_fails() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let f = folder(&s, &alice, "f", None).await;

  let err = access(&s)
    .grant(alice.user_id, Uuid::new_v4(), f.folder_id, PermissionFlags::READ)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::UserNotFound(_)));
}

// ─── Folder service ──────────────────────────────────────────────────────────

fn folders(s: &SqliteStore) -> FolderService<SqliteStore> {
  FolderService::new(access(s), Scope::Direct)
}

#[tokio::test]
async fn creating_a_subfolder_needs_write_on_parent() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let svc = folders(&s);

  let root = svc.create(alice.user_id, "projects", None).await.unwrap();
  assert_eq!(root.path, "/projects");

  let err = svc.create(bob.user_id, "sneaky", Some(root.folder_id)).await.unwrap_err();
  assert!(matches!(err, CoreError::PermissionDenied(_)));

  let write = PermissionFlags { can_write: true, ..Default::default() };
  svc.access().grant(alice.user_id, bob.user_id, root.folder_id, write).await.unwrap();
  let child = svc.create(bob.user_id, "bobs", Some(root.folder_id)).await.unwrap();
  assert_eq!(child.path, "/projects/bobs");
  assert_eq!(child.owner_id, bob.user_id);

  let err = svc.create(alice.user_id, "bobs", Some(root.folder_id)).await.unwrap_err();
  assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn invalid_folder_names_are_rejected() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let err = folders(&s).create(alice.user_id, "a/b", None).await.unwrap_err();
  assert!(matches!(err, CoreError::BadRequest(_)));
}

#[tokio::test]
async fn listing_reports_effective_flags() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let svc = folders(&s);
  let f = svc.create(alice.user_id, "f", None).await.unwrap();
  svc.access().grant(alice.user_id, bob.user_id, f.folder_id, PermissionFlags::READ).await.unwrap();

  let listed = svc.list(bob.user_id).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert!(!listed[0].is_owner);
  assert_eq!(listed[0].permissions, PermissionFlags::READ);

  let err = svc.delete(bob.user_id, f.folder_id).await.unwrap_err();
  assert!(matches!(err, CoreError::PermissionDenied(_)));
  let err = svc.permissions(bob.user_id, f.folder_id).await.unwrap_err();
  assert!(matches!(err, CoreError::PermissionDenied(_)));
  assert_eq!(svc.permissions(alice.user_id, f.folder_id).await.unwrap().len(), 1);
}

// ─── Randomised properties ───────────────────────────────────────────────────

fn pick(n: usize) -> usize { OsRng.next_u32() as usize % n }

fn random_flags() -> PermissionFlags {
  let bits = OsRng.next_u32();
  PermissionFlags {
    can_read:   bits & 1 != 0,
    can_write:  bits & 2 != 0,
    can_delete: bits & 4 != 0,
    is_admin:   bits & 8 == 8 && bits & 16 == 16,
  }
}

/// A random forest with random grants, documents and chunks.
async fn random_world(s: &SqliteStore) -> (Vec<User>, Vec<Folder>) {
  let mut users = Vec::new();
  for i in 0..4 {
    users.push(user(s, &format!("user{i}")).await);
  }

  let mut folders: Vec<Folder> = Vec::new();
  for i in 0..12 {
    let owner = &users[pick(users.len())];
    let parent = if folders.is_empty() || pick(3) == 0 {
      None
    } else {
      Some(folders[pick(folders.len())].clone())
    };
    folders.push(folder(s, owner, &format!("f{i}"), parent.as_ref()).await);
  }

  for _ in 0..10 {
    let to = &users[pick(users.len())];
    let on = &folders[pick(folders.len())];
    grant_raw(s, to, on, random_flags(), &users[0]).await;
  }

  for (i, f) in folders.iter().enumerate() {
    let d = document(s, &users[0], f, &format!("doc{i}.txt")).await;
    let chunks = (0..3)
      .map(|j| {
        let v = vec![1.0 + pick(5) as f32, pick(5) as f32, j as f32];
        chunk(&format!("chunk {j} of doc{i}"), v)
      })
      .collect();
    s.replace_embeddings(d, chunks).await.unwrap();
  }

  (users, folders)
}

#[tokio::test]
async fn retrieval_never_leaks_outside_accessible_folders() {
  for _ in 0..8 {
    let s = store().await;
    let (users, _) = random_world(&s).await;
    let ac = access(&s);

    for u in &users {
      let allowed: Vec<Uuid> = ac
        .accessible_folders(u.user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.folder_id)
        .collect();

      let hits = s
        .search_similar(&SimilarityQuery {
          vector:         vec![1.0, 1.0, 1.0],
          folder_ids:     allowed.clone(),
          limit:          1000,
          min_similarity: -1.0,
        })
        .await
        .unwrap();

      for hit in hits {
        assert!(allowed.contains(&hit.folder_id));
        let doc = s.get_document(hit.embedding.document_id).await.unwrap().unwrap();
        assert!(allowed.contains(&doc.folder_id));
      }
    }
  }
}

#[tokio::test]
async fn inheritance_is_monotone() {
  for _ in 0..5 {
    let s = store().await;
    let (users, folders) = random_world(&s).await;
    let ac = access(&s);

    for u in &users {
      for f in &folders {
        let Some(parent_id) = f.parent_id else { continue };
        for cap in Capability::iter() {
          if ac.check(u.user_id, parent_id, cap).await.unwrap() {
            assert!(ac.check(u.user_id, f.folder_id, cap).await.unwrap());
          }
        }
      }
    }
  }
}
