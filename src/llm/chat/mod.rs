pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream };
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;

pub type BoxError = Box<dyn StdError + Send + Sync>;
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

/// A completion engine that turns an ordered message list into a reply.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the messages with streaming enabled; fragments arrive in order.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChatStream, BoxError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> ChatStream
    where
        F: FnOnce(mpsc::Sender<Result<String, BoxError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// Reassembles newline-terminated lines from arbitrarily split network chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every line it completed, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim_end_matches('\r').to_string();
        self.pending.clear();
        Some(rest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::{ stream, StreamExt };
    use std::sync::Mutex;

    /// Replays canned fragments and records every request it receives.
    pub(crate) struct ScriptedChatClient {
        pub fragments: Vec<String>,
        pub fail_with: Option<String>,
        pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChatClient {
        pub(crate) fn replying(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|s| s.to_string()).collect(),
                fail_with: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                fragments: Vec::new(),
                fail_with: Some(message.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn last_request(&self) -> Vec<ChatMessage> {
            self.requests.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChatClient {
        async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChatStream, BoxError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            if let Some(message) = &self.fail_with {
                return Err(message.clone().into());
            }
            let items: Vec<Result<String, BoxError>> = self.fragments
                .iter()
                .cloned()
                .map(Ok)
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        fn get_model(&self) -> String {
            "scripted".to_string()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn scripted_client_records_requests() {
        let client = ScriptedChatClient::replying(&["Keep ", "hydrated."]);
        let mut stream = client.stream_chat(&[ChatMessage::user("fever")]).await.unwrap();
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "Keep hydrated.");
        assert_eq!(client.last_request()[0].content, "fever");
    }

    #[tokio::test]
    async fn streaming_response_forwards_channel_items() {
        let mut stream = create_streaming_response(|tx| async move {
            let _ = tx.send(Ok("a".to_string())).await;
            let _ = tx.send(Ok("b".to_string())).await;
        });
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "ab");
    }

    #[test]
    fn line_buffer_reassembles_split_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\r\ndata: [DO"), vec!["data: {\"a\":1}".to_string()]);
        assert_eq!(buf.push(b"NE]\n\n"), vec!["data: [DONE]".to_string(), String::new()]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_multibyte_characters_intact() {
        let bytes = "data: é\n".as_bytes();
        let mut buf = LineBuffer::new();
        assert!(buf.push(&bytes[..7]).is_empty());
        assert_eq!(buf.push(&bytes[7..]), vec!["data: é".to_string()]);
    }
}
