//! Rewriting the newest chat message into a standalone retrieval query.

use std::{sync::Arc, time::Duration};

use crate::model::{ChatMessage, Completer, Role, Sampling, with_timeout};

const SYSTEM_PROMPT: &str = "You rewrite follow-up questions. Given a conversation \
and the user's latest message, rewrite the latest message as a single standalone \
question that can be understood without the conversation. Keep names, numbers and \
other specifics. Reply with the rewritten question only.";

/// Replies shorter than this are treated as failures.
const MIN_QUERY_CHARS: usize = 5;

#[derive(Clone)]
pub struct Reformulator {
  completer: Arc<dyn Completer>,
  window:    usize,
  timeout:   Duration,
}

/// The content of the newest user message, if any.
pub fn latest_user_message(history: &[ChatMessage]) -> Option<&str> {
  history
    .iter()
    .rev()
    .find(|m| m.role == Role::User)
    .map(|m| m.content.as_str())
}

impl Reformulator {
  pub fn new(completer: Arc<dyn Completer>, window: usize, timeout: Duration) -> Self {
    Self { completer, window, timeout }
  }

  /// A standalone query for the newest user message in `history`.
  ///
  /// Never fails: with no prior context, or when the model call fails, times
  /// out or answers with almost nothing, the newest message is returned
  /// verbatim.
  pub async fn reformulate(&self, history: &[ChatMessage]) -> String {
    let Some(latest) = latest_user_message(history) else {
      return String::new();
    };
    if history.len() <= 1 {
      return latest.to_owned();
    }

    let prior = &history[..history.len() - 1];
    let context = &prior[prior.len().saturating_sub(self.window)..];
    let transcript = context
      .iter()
      .map(|m| format!("{}: {}", role_label(m.role), m.content))
      .collect::<Vec<_>>()
      .join("\n");
    let prompt = format!(
      "Conversation:\n{transcript}\n\nLatest message: {latest}\n\nStandalone question:"
    );

    let call = self.completer.complete(SYSTEM_PROMPT, vec![ChatMessage::user(prompt)], Sampling {
      max_tokens:  100,
      temperature: 0.0,
    });

    match with_timeout(self.timeout, call).await {
      Ok(reply) if reply.trim().chars().count() >= MIN_QUERY_CHARS => {
        let rewritten = reply.trim().to_owned();
        tracing::debug!(original = latest, %rewritten, "reformulated chat query");
        rewritten
      }
      Ok(reply) => {
        tracing::warn!(reply = reply.trim(), "reformulation too short; using original message");
        latest.to_owned()
      }
      Err(e) => {
        tracing::warn!(error = %e, "reformulation failed; using original message");
        latest.to_owned()
      }
    }
  }
}

fn role_label(role: Role) -> &'static str {
  match role {
    Role::System => "System",
    Role::User => "User",
    Role::Assistant => "Assistant",
  }
}
