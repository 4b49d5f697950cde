use log::{ info, warn };
use uuid::Uuid;

use crate::document::{ ExtractError, TextExtractor };
use crate::models::chat::{ ChatMessage, SessionView };

/// Result of handing an uploaded file to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Text extracted and retained; replaces any earlier document.
    Ready {
        name: String,
        chars: usize,
    },
    /// Same file name as the retained document, nothing re-processed.
    Unchanged {
        name: String,
    },
    /// Parsed fine but produced no text, session left as it was.
    Empty {
        name: String,
    },
}

/// The single in-memory conversation of a running instance.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    history: Vec<ChatMessage>,
    document_text: Option<String>,
    document_ready: bool,
    last_uploaded_name: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            history: Vec::new(),
            document_text: None,
            document_ready: false,
            last_uploaded_name: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn document_ready(&self) -> bool {
        self.document_ready
    }

    pub fn document_text(&self) -> Option<&str> {
        self.document_text.as_deref()
    }

    pub fn last_uploaded_name(&self) -> Option<&str> {
        self.last_uploaded_name.as_deref()
    }

    /// Document text, only when it is ready to be spliced into a prompt.
    pub fn ready_document(&self) -> Option<&str> {
        if self.document_ready { self.document_text.as_deref() } else { None }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Starts a new chat. The last uploaded file name survives, so the same
    /// file is not re-read until a differently named one arrives.
    pub fn reset(&mut self) {
        info!("Resetting session {} ({} messages dropped)", self.id, self.history.len());
        self.id = Uuid::new_v4().to_string();
        self.history.clear();
        self.document_text = None;
        self.document_ready = false;
    }

    pub fn ingest_document(
        &mut self,
        name: &str,
        bytes: &[u8],
        extractor: &dyn TextExtractor
    ) -> Result<UploadOutcome, ExtractError> {
        if self.last_uploaded_name.as_deref() == Some(name) {
            info!("Upload '{}' matches the retained document, skipping extraction", name);
            return Ok(UploadOutcome::Unchanged { name: name.to_string() });
        }

        let text = extractor.extract(bytes).map_err(|e| {
            warn!("Error reading PDF '{}': {}", name, e);
            e
        })?;

        if text.is_empty() {
            warn!("Upload '{}' produced no text; keeping previous document state", name);
            return Ok(UploadOutcome::Empty { name: name.to_string() });
        }

        let chars = text.chars().count();
        self.document_text = Some(text);
        self.last_uploaded_name = Some(name.to_string());
        self.document_ready = true;
        info!("Document '{}' ready for reference ({} chars)", name, chars);

        Ok(UploadOutcome::Ready { name: name.to_string(), chars })
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            messages: self.history.clone(),
            document_ready: self.document_ready,
            document_name: if self.document_ready { self.last_uploaded_name.clone() } else { None },
        }
    }
}
