//! Conversation-store boundary (REST).
//!
//! Message and conversation persistence is owned by an external service;
//! this crate only reads and issues idempotent mutations against it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::core::normalize::{RawConversation, RawMessage};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("resource not found")]
    NotFound,
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("invalid store url: {0}")]
    Url(#[from] url::ParseError),
}

#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    async fn list_conversations(&self) -> Result<Vec<RawConversation>, StoreError>;
    async fn message_history(&self, conversation_id: &str) -> Result<Vec<RawMessage>, StoreError>;
    async fn open_support_conversation(&self) -> Result<RawConversation, StoreError>;
    async fn mark_read(&self, conversation_id: &str) -> Result<(), StoreError>;
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;
    async fn delete_message(&self, message_id: &str) -> Result<(), StoreError>;
}

pub struct HttpConversationStore {
    base: String,
    client: reqwest::Client,
}

impl HttpConversationStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        // Parse for early validation; requests are built from the string.
        Url::parse(base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    match resp.status() {
        s if s.is_success() => Ok(resp),
        StatusCode::NOT_FOUND => Err(StoreError::NotFound),
        s => Err(StoreError::Status(s)),
    }
}

/// Deletes and mark-as-read are idempotent: a 404 means there is nothing
/// left to do, not a failure.
fn ignore_not_found(result: Result<reqwest::Response, StoreError>) -> Result<(), StoreError> {
    match result {
        Ok(_) | Err(StoreError::NotFound) => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    async fn list_conversations(&self) -> Result<Vec<RawConversation>, StoreError> {
        let resp = self
            .client
            .get(format!("{}/conversations", self.base))
            .send()
            .await?;
        Ok(check_status(resp)?.json().await?)
    }

    async fn message_history(&self, conversation_id: &str) -> Result<Vec<RawMessage>, StoreError> {
        let resp = self
            .client
            .get(format!(
                "{}/conversations/{conversation_id}/messages",
                self.base
            ))
            .send()
            .await?;
        Ok(check_status(resp)?.json().await?)
    }

    async fn open_support_conversation(&self) -> Result<RawConversation, StoreError> {
        let resp = self
            .client
            .post(format!("{}/conversations/support", self.base))
            .send()
            .await?;
        Ok(check_status(resp)?.json().await?)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), StoreError> {
        let resp = self
            .client
            .patch(format!("{}/conversations/{conversation_id}/read", self.base))
            .send()
            .await?;
        ignore_not_found(check_status(resp))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let resp = self
            .client
            .delete(format!("{}/conversations/{conversation_id}", self.base))
            .send()
            .await?;
        ignore_not_found(check_status(resp))
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), StoreError> {
        let resp = self
            .client
            .delete(format!("{}/messages/{message_id}", self.base))
            .send()
            .await?;
        ignore_not_found(check_status(resp))
    }
}
