use futures::StreamExt;
use log::{ debug, error, info };
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::prompt::{ PromptConfig, DOCUMENT_KEYWORDS };
use crate::llm::chat::{ BoxError, ChatClient };
use crate::models::chat::ChatMessage;
use crate::session::Session;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Completion request failed: {0}")] Completion(BoxError),
    #[error("Completion stream failed: {0}")] Stream(BoxError),
}

/// True when the prompt mentions the uploaded document in any casing.
pub fn wants_document(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    DOCUMENT_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

pub fn document_prompt(document_text: &str, prompt: &str) -> String {
    format!("DOCUMENT CONTEXT:\n{}\n\nUSER QUESTION: {}", document_text, prompt)
}

#[derive(Clone)]
pub struct DocAgent {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
}

impl DocAgent {
    pub fn new(chat_client: Arc<dyn ChatClient>, prompt_config: PromptConfig) -> Self {
        info!(
            "Chat client configured: Model={}, BaseURL={}",
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );
        Self {
            chat_client,
            prompt_config: Arc::new(prompt_config),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.prompt_config.system_prompt
    }

    /// Records the user turn and returns the message list to send.
    ///
    /// History keeps the prompt as typed; the document splice only touches
    /// the outgoing copy of the last message.
    pub fn prepare_turn(&self, session: &mut Session, prompt: &str) -> Vec<ChatMessage> {
        let include_document = wants_document(prompt);
        session.push(ChatMessage::user(prompt));

        let mut outgoing = Vec::with_capacity(session.history().len() + 1);
        outgoing.push(ChatMessage::system(self.system_prompt()));
        outgoing.extend(session.history().iter().cloned());

        if include_document {
            if let (Some(text), Some(last)) = (session.ready_document(), outgoing.last_mut()) {
                debug!("Splicing {} chars of document context into the prompt", text.len());
                last.content = document_prompt(text, prompt);
            }
        }

        outgoing
    }

    /// Runs one full turn. Fragments are forwarded to `fragments` as they
    /// arrive; the concatenated reply is appended to history and returned.
    pub async fn respond(
        &self,
        session: &mut Session,
        prompt: &str,
        fragments: Option<&mpsc::Sender<String>>
    ) -> Result<String, AgentError> {
        let outgoing = self.prepare_turn(session, prompt);
        info!("Session {}: sending {} messages to the completion engine", session.id(), outgoing.len());

        let mut stream = self.chat_client
            .stream_chat(&outgoing).await
            .map_err(|e| {
                error!("Completion request failed: {}", e);
                AgentError::Completion(e)
            })?;

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let fragment = chunk.map_err(|e| {
                error!("Completion stream failed: {}", e);
                AgentError::Stream(e)
            })?;
            if let Some(tx) = fragments {
                // A vanished listener does not cancel the turn.
                let _ = tx.send(fragment.clone()).await;
            }
            reply.push_str(&fragment);
        }

        session.push(ChatMessage::assistant(reply.clone()));
        info!("Session {}: reply recorded ({} chars)", session.id(), reply.len());
        Ok(reply)
    }
}
