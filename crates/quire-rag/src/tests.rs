//! End-to-end pipeline tests over an in-memory SQLite store, an in-memory
//! blob store and keyword-based fake models.

use std::{
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use quire_core::{
  ErrorKind,
  access::AccessControl,
  folders::FolderService,
  permission::PermissionFlags,
  store::DocumentStore,
  user::User,
};
use quire_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{
  Ingestor, ModelSettings, RagService, RagSettings,
  blob::MemoryBlobStore,
  model::{ChatMessage, Completer, Embedder, ModelError, Sampling},
  service::NO_RESULTS_ANSWER,
  types::{ChatRequest, RagQuery},
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

const KEYWORDS: [&str; 2] = ["revenue", "ai"];

/// One dimension per keyword plus a constant, so unrelated text still has a
/// non-zero vector.
#[derive(Default)]
struct FakeEmbedder {
  calls: AtomicUsize,
}

fn keyword_vector(text: &str) -> Vec<f32> {
  let words: Vec<String> = text
    .split_whitespace()
    .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
    .collect();
  let mut v: Vec<f32> = KEYWORDS
    .iter()
    .map(|k| if words.iter().any(|w| w == k) { 1.0 } else { 0.0 })
    .collect();
  v.push(0.1);
  v
}

#[async_trait]
impl Embedder for FakeEmbedder {
  async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ModelError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(texts.iter().map(|t| keyword_vector(t)).collect())
  }

  fn dimension(&self) -> usize { KEYWORDS.len() + 1 }

  fn model_name(&self) -> &str { "keywords" }
}

struct FakeCompleter {
  reply: Option<String>,
  calls: AtomicUsize,
}

impl FakeCompleter {
  fn replying(reply: &str) -> Self {
    Self { reply: Some(reply.to_owned()), calls: AtomicUsize::new(0) }
  }

  fn failing() -> Self { Self { reply: None, calls: AtomicUsize::new(0) } }
}

#[async_trait]
impl Completer for FakeCompleter {
  async fn complete(
    &self,
    _system_prompt: &str,
    _messages: Vec<ChatMessage>,
    _sampling: Sampling,
  ) -> Result<String, ModelError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.reply.clone().ok_or(ModelError::Status {
      status: 503,
      body:   "unavailable".into(),
    })
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct World {
  store:     Arc<SqliteStore>,
  blobs:     Arc<MemoryBlobStore>,
  embedder:  Arc<FakeEmbedder>,
  completer: Arc<FakeCompleter>,
  folders:   FolderService<SqliteStore>,
  ingestor:  Ingestor<SqliteStore>,
  rag:       RagService<SqliteStore>,
}

async fn world(completer: FakeCompleter) -> World {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let access = AccessControl::new(Arc::clone(&store));
  let blobs = Arc::new(MemoryBlobStore::new());
  let embedder = Arc::new(FakeEmbedder::default());
  let completer = Arc::new(completer);

  let settings = RagSettings::default();
  let models = ModelSettings {
    embedding_dimension: KEYWORDS.len() + 1,
    timeout_secs: 5,
    ..ModelSettings::default()
  };

  World {
    folders: FolderService::new(access.clone(), settings.scope()),
    ingestor: Ingestor::new(
      access.clone(),
      blobs.clone(),
      embedder.clone(),
      settings.clone(),
      Duration::from_secs(5),
    ),
    rag: RagService::new(access, embedder.clone(), completer.clone(), &settings, models),
    store,
    blobs,
    embedder,
    completer,
  }
}

impl World {
  async fn user(&self, name: &str) -> User {
    self.store.add_user(name.into(), false).await.unwrap()
  }

  async fn ingest(&self, user: &User, folder_id: Uuid, name: &str, text: &str) -> Uuid {
    let doc = self
      .ingestor
      .upload(user.user_id, folder_id, name, Bytes::from(text.to_owned()))
      .await
      .unwrap();
    self.ingestor.regenerate_embeddings(doc.document_id).await.unwrap();
    doc.document_id
  }

  fn embed_calls(&self) -> usize { self.embedder.calls.load(Ordering::SeqCst) }

  fn completion_calls(&self) -> usize { self.completer.calls.load(Ordering::SeqCst) }
}

fn query_in(text: &str, folder: Uuid) -> RagQuery {
  RagQuery { folder_ids: Some(vec![folder]), ..RagQuery::new(text) }
}

// ─── Query ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn revenue_is_visible_only_after_a_read_grant() {
  let w = world(FakeCompleter::replying("Revenue in Q3 was $4.2M.")).await;
  let alice = w.user("alice").await;
  let bob = w.user("bob").await;

  let finance = w.folders.create(alice.user_id, "Finance", None).await.unwrap();
  w.ingest(&alice, finance.folder_id, "q3.txt", "Q3 revenue was $4.2M. Costs were flat.")
    .await;

  let err = w
    .rag
    .query(bob.user_id, query_in("What was revenue in Q3?", finance.folder_id))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PermissionDenied);

  w.rag
    .access()
    .grant(alice.user_id, bob.user_id, finance.folder_id, PermissionFlags::READ)
    .await
    .unwrap();

  let resp = w
    .rag
    .query(bob.user_id, query_in("What was revenue in Q3?", finance.folder_id))
    .await
    .unwrap();
  assert_eq!(resp.answer, "Revenue in Q3 was $4.2M.");
  assert!(!resp.sources.is_empty());
  assert_eq!(resp.total_chunks, resp.sources.len());
  assert!(resp.sources.iter().all(|s| s.folder_id == finance.folder_id));
  assert!(resp.sources.iter().all(|s| s.document_name == "q3.txt"));
}

#[tokio::test]
async fn empty_allow_list_fails_before_embedding() {
  let w = world(FakeCompleter::replying("unused")).await;
  let carol = w.user("carol").await;

  let err = w
    .rag
    .query(carol.user_id, RagQuery::new("What was revenue?"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PermissionDenied);
  assert_eq!(w.embed_calls(), 0);
  assert_eq!(w.completion_calls(), 0);
}

#[tokio::test]
async fn requested_folders_outside_access_are_dropped() {
  let w = world(FakeCompleter::replying("answer")).await;
  let alice = w.user("alice").await;
  let bob = w.user("bob").await;

  let mine = w.folders.create(bob.user_id, "Mine", None).await.unwrap();
  let theirs = w.folders.create(alice.user_id, "Theirs", None).await.unwrap();
  w.ingest(&alice, theirs.folder_id, "secret.txt", "Secret revenue figures.").await;

  let allowed = w
    .rag
    .allow_list(bob.user_id, Some(&[theirs.folder_id, mine.folder_id][..]))
    .await
    .unwrap();
  assert_eq!(allowed, [mine.folder_id]);

  let resp = w
    .rag
    .query(bob.user_id, RagQuery {
      folder_ids: Some(vec![theirs.folder_id, mine.folder_id]),
      ..RagQuery::new("revenue")
    })
    .await
    .unwrap();
  assert!(resp.sources.is_empty());
}

#[tokio::test]
async fn no_hits_is_a_successful_empty_answer() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Notes", None).await.unwrap();
  w.ingest(&alice, f.folder_id, "ai.txt", "Notes about AI models.").await;

  let resp = w
    .rag
    .query(alice.user_id, query_in("revenue", f.folder_id))
    .await
    .unwrap();
  assert_eq!(resp.answer, NO_RESULTS_ANSWER);
  assert!(resp.sources.is_empty());
  assert_eq!(resp.total_chunks, 0);
  assert_eq!(w.completion_calls(), 0);
}

#[tokio::test]
async fn answer_failure_is_an_upstream_error() {
  let w = world(FakeCompleter::failing()).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Finance", None).await.unwrap();
  w.ingest(&alice, f.folder_id, "q3.txt", "Q3 revenue was $4.2M.").await;

  let err = w
    .rag
    .query(alice.user_id, query_in("revenue", f.folder_id))
    .await
    .unwrap_err();
  assert!(matches!(err, quire_core::Error::Upstream(_)), "{err:?}");
}

// ─── Chat ────────────────────────────────────────────────────────────────────

fn chat(messages: Vec<ChatMessage>, folder: Uuid) -> ChatRequest {
  ChatRequest {
    messages,
    folder_ids: vec![folder],
    limit: 10,
    min_relevance_score: 0.7,
  }
}

#[tokio::test]
async fn single_message_chat_skips_reformulation() {
  let w = world(FakeCompleter::replying("Revenue was $4.2M.")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Finance", None).await.unwrap();
  w.ingest(&alice, f.folder_id, "q3.txt", "Q3 revenue was $4.2M.").await;

  let resp = w
    .rag
    .chat(alice.user_id, chat(vec![ChatMessage::user("What was revenue?")], f.folder_id))
    .await
    .unwrap();
  assert!(resp.reformulated_query.is_none());
  assert!(!resp.sources.is_empty());
  // Only the answer itself was generated.
  assert_eq!(w.completion_calls(), 1);
}

#[tokio::test]
async fn lone_message_is_its_own_query() {
  let w = world(FakeCompleter::replying("unused")).await;
  let query = crate::reformulate::Reformulator::new(w.completer.clone(), 5, Duration::from_secs(1))
    .reformulate(&[ChatMessage::user("What is AI?")])
    .await;
  assert_eq!(query, "What is AI?");
  assert_eq!(w.completion_calls(), 0);
}

#[tokio::test]
async fn follow_up_is_reformulated() {
  let w = world(FakeCompleter::replying("What was the revenue in Q3?")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Finance", None).await.unwrap();
  w.ingest(&alice, f.folder_id, "q3.txt", "Q3 revenue was $4.2M.").await;

  let resp = w
    .rag
    .chat(
      alice.user_id,
      chat(
        vec![
          ChatMessage::user("Tell me about Q3."),
          ChatMessage::assistant("Q3 was a good quarter."),
          ChatMessage::user("and how much did we make?"),
        ],
        f.folder_id,
      ),
    )
    .await
    .unwrap();
  assert_eq!(resp.reformulated_query.as_deref(), Some("What was the revenue in Q3?"));
  assert!(!resp.sources.is_empty());
  assert_eq!(w.completion_calls(), 2);
}

#[tokio::test]
async fn failed_reformulation_falls_back_to_the_latest_message() {
  let w = world(FakeCompleter::failing()).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Finance", None).await.unwrap();

  let history = vec![
    ChatMessage::user("Tell me about Q3."),
    ChatMessage::assistant("Sure."),
    ChatMessage::user("revenue please"),
  ];
  let query = crate::reformulate::Reformulator::new(w.completer.clone(), 5, Duration::from_secs(1))
    .reformulate(&history)
    .await;
  assert_eq!(query, "revenue please");

  // Empty folder: no hits, so no answer call that could fail.
  let resp = w.rag.chat(alice.user_id, chat(history, f.folder_id)).await.unwrap();
  assert!(resp.reformulated_query.is_none());
  assert_eq!(resp.content, NO_RESULTS_ANSWER);
}

#[tokio::test]
async fn too_short_reformulation_is_ignored() {
  let w = world(FakeCompleter::replying("ok")).await;
  let history = vec![
    ChatMessage::user("first question"),
    ChatMessage::assistant("first answer"),
    ChatMessage::user("second question"),
  ];
  let query = crate::reformulate::Reformulator::new(w.completer.clone(), 5, Duration::from_secs(1))
    .reformulate(&history)
    .await;
  assert_eq!(query, "second question");
}

/// Records every prompt and answers after an optional delay.
struct RecordingCompleter {
  reply:   String,
  delay:   Duration,
  prompts: std::sync::Mutex<Vec<String>>,
}

impl RecordingCompleter {
  fn new(reply: &str, delay: Duration) -> Arc<Self> {
    Arc::new(Self { reply: reply.to_owned(), delay, prompts: Default::default() })
  }
}

#[async_trait]
impl Completer for RecordingCompleter {
  async fn complete(
    &self,
    _system_prompt: &str,
    messages: Vec<ChatMessage>,
    _sampling: Sampling,
  ) -> Result<String, ModelError> {
    self
      .prompts
      .lock()
      .unwrap()
      .extend(messages.into_iter().map(|m| m.content));
    tokio::time::sleep(self.delay).await;
    Ok(self.reply.clone())
  }
}

fn alternating_history(len: usize) -> Vec<ChatMessage> {
  (0..len)
    .map(|i| {
      if i % 2 == 0 {
        ChatMessage::user(format!("u{i}"))
      } else {
        ChatMessage::assistant(format!("a{i}"))
      }
    })
    .collect()
}

#[tokio::test]
async fn reformulation_sees_only_the_trailing_window() {
  let completer = RecordingCompleter::new("What happened in Q3?", Duration::ZERO);
  let query = crate::reformulate::Reformulator::new(completer.clone(), 5, Duration::from_secs(1))
    .reformulate(&alternating_history(9))
    .await;
  assert_eq!(query, "What happened in Q3?");

  let prompts = completer.prompts.lock().unwrap().clone();
  assert_eq!(prompts, [
    "Conversation:\nAssistant: a3\nUser: u4\nAssistant: a5\nUser: u6\nAssistant: a7\n\n\
     Latest message: u8\n\nStandalone question:"
  ]);
}

#[tokio::test]
async fn slow_reformulation_falls_back_to_the_latest_message() {
  let completer = RecordingCompleter::new("What happened in Q3?", Duration::from_secs(5));
  let mut history = alternating_history(2);
  history.push(ChatMessage::user("newest"));

  let query =
    crate::reformulate::Reformulator::new(completer.clone(), 5, Duration::from_millis(50))
      .reformulate(&history)
      .await;
  assert_eq!(query, "newest");
  assert_eq!(completer.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn chat_on_foreign_folder_is_denied_without_model_calls() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let bob = w.user("bob").await;
  let f = w.folders.create(alice.user_id, "Private", None).await.unwrap();

  let err = w
    .rag
    .chat(bob.user_id, chat(vec![ChatMessage::user("revenue?")], f.folder_id))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PermissionDenied);
  assert_eq!(w.embed_calls(), 0);
  assert_eq!(w.completion_calls(), 0);
}

// ─── Folders, suggestions, health ────────────────────────────────────────────

#[tokio::test]
async fn queryable_folders_and_health_reflect_embeddings() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let full = w.folders.create(alice.user_id, "Full", None).await.unwrap();
  let empty = w.folders.create(alice.user_id, "Empty", None).await.unwrap();
  w.ingest(&alice, full.folder_id, "a.txt", "Revenue grew. AI helped.").await;

  let folders = w.rag.queryable_folders(alice.user_id).await.unwrap();
  assert_eq!(folders.len(), 2);
  let by_id = |id| folders.iter().find(|f| f.id == id).unwrap();
  assert!(by_id(full.folder_id).can_query);
  assert_eq!(by_id(full.folder_id).document_count, 1);
  assert!(!by_id(empty.folder_id).can_query);

  let health = w.rag.health(alice.user_id).await.unwrap();
  assert_eq!(health.status, "healthy");
  assert_eq!(health.accessible_folders, 2);
  assert_eq!(health.queryable_folders, 1);
  assert_eq!(health.total_documents, 1);
  assert!(health.total_embeddings >= 1);
  assert!(health.can_query);

  let stranger = w.user("stranger").await;
  let health = w.rag.health(stranger.user_id).await.unwrap();
  assert_eq!(health.accessible_folders, 0);
  assert!(!health.can_query);
}

#[tokio::test]
async fn suggestions_are_parsed_and_failures_are_empty() {
  let w = world(FakeCompleter::replying(
    "1. What drove revenue?\n2. How did costs change?\n- Who owns the budget?",
  ))
  .await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Finance", None).await.unwrap();
  w.ingest(&alice, f.folder_id, "q3.txt", "Q3 revenue was $4.2M.").await;

  let got = w.rag.suggest_related_queries(alice.user_id, "revenue", None).await;
  assert_eq!(got, [
    "What drove revenue?",
    "How did costs change?",
    "Who owns the budget?"
  ]);

  let failing = world(FakeCompleter::failing()).await;
  let bob = failing.user("bob").await;
  let g = failing.folders.create(bob.user_id, "Notes", None).await.unwrap();
  failing.ingest(&bob, g.folder_id, "n.txt", "Some notes.").await;
  assert!(failing.rag.suggest_related_queries(bob.user_id, "x", None).await.is_empty());
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_upload_is_rejected_and_leaves_no_blob() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Docs", None).await.unwrap();

  w.ingestor
    .upload(alice.user_id, f.folder_id, "a.txt", Bytes::from_static(b"one"))
    .await
    .unwrap();
  assert_eq!(w.blobs.len().await, 1);

  let err = w
    .ingestor
    .upload(alice.user_id, f.folder_id, "a.txt", Bytes::from_static(b"two"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);
  assert_eq!(w.blobs.len().await, 1);
}

#[tokio::test]
async fn upload_rejects_bad_files() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let bob = w.user("bob").await;
  let folder_id = w.folders.create(alice.user_id, "Docs", None).await.unwrap().folder_id;

  let up = |user: Uuid, name: &'static str, body: &'static [u8]| {
    let ingestor = w.ingestor.clone();
    async move {
      ingestor
        .upload(user, folder_id, name, Bytes::from_static(body))
        .await
        .unwrap_err()
        .kind()
    }
  };

  assert_eq!(up(bob.user_id, "a.txt", b"x").await, ErrorKind::PermissionDenied);
  assert_eq!(up(alice.user_id, "empty.txt", b"").await, ErrorKind::BadRequest);
  assert_eq!(up(alice.user_id, "noext", b"x").await, ErrorKind::BadRequest);
  assert_eq!(up(alice.user_id, "setup.exe", b"MZ").await, ErrorKind::BadRequest);
  assert_eq!(w.blobs.len().await, 0);
}

#[tokio::test]
async fn upload_records_hash_and_stats_follow_regeneration() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Docs", None).await.unwrap();

  let doc = w
    .ingestor
    .upload(alice.user_id, f.folder_id, "a.txt", Bytes::from_static(b"abc"))
    .await
    .unwrap();
  assert_eq!(
    doc.metadata["file_hash"],
    "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
  );
  assert_eq!(doc.metadata["original_filename"], "a.txt");

  let stats = w.ingestor.embedding_stats(alice.user_id, doc.document_id).await.unwrap();
  assert_eq!(stats.total_chunks, 0);
  assert_eq!(stats.average_chunk_size, 0);

  let written = w.ingestor.reprocess(alice.user_id, doc.document_id).await.unwrap();
  assert_eq!(written, 1);
  let stats = w.ingestor.embedding_stats(alice.user_id, doc.document_id).await.unwrap();
  assert_eq!(stats.total_chunks, 1);
  assert_eq!(stats.total_characters, 3);
  assert_eq!(stats.average_chunk_size, 3);
}

#[tokio::test]
async fn background_regeneration_writes_chunks() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Docs", None).await.unwrap();
  let doc = w
    .ingestor
    .upload(alice.user_id, f.folder_id, "a.txt", Bytes::from_static(b"AI revenue."))
    .await
    .unwrap();

  w.ingestor.spawn_regenerate(doc.document_id).await.unwrap();
  assert_eq!(w.store.list_embeddings(doc.document_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn html_chunks_carry_only_visible_text() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Docs", None).await.unwrap();
  let page = "<html><head><style>body{color:red}</style><script>track()</script></head>\
              <body><p>Revenue was $2.5M.</p></body></html>";

  let doc_id = w.ingest(&alice, f.folder_id, "q3.html", page).await;

  let chunks = w.store.list_embeddings(doc_id).await.unwrap();
  assert_eq!(chunks.len(), 1);
  assert_eq!(chunks[0].chunk_text, "Revenue was $2.5M.");
}

#[tokio::test]
async fn missing_documents_look_forbidden_except_to_superusers() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let root = w.store.add_user("root".into(), true).await.unwrap();
  let missing = Uuid::new_v4();

  let err = w.ingestor.get(alice.user_id, missing).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PermissionDenied);
  let err = w.ingestor.get(root.user_id, missing).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn deleting_a_document_removes_its_blob() {
  let w = world(FakeCompleter::replying("unused")).await;
  let alice = w.user("alice").await;
  let f = w.folders.create(alice.user_id, "Docs", None).await.unwrap();
  let id = w.ingest(&alice, f.folder_id, "a.txt", "Revenue.").await;

  let (doc, bytes) = w.ingestor.download(alice.user_id, id).await.unwrap();
  assert_eq!(&bytes[..], b"Revenue.");
  assert!(w.blobs.contains(&doc.storage_key).await);

  w.ingestor.delete(alice.user_id, id).await.unwrap();
  assert!(!w.blobs.contains(&doc.storage_key).await);
  assert!(w.store.get_document(id).await.unwrap().is_none());
}
