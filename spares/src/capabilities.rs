//! Capability interfaces for resources the core depends on but does not
//! implement: OAuth, LLM calls, TTS/image generation, email delivery,
//! object storage. Each trait is the seam a concrete adapter would plug
//! into; this crate ships no implementation of any of them.

use crate::Error;
use async_trait::async_trait;

/// Text-to-speech for a note's orthographic form.
#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, Error>;
}

/// Chat/completion calls backing the AI tutor ([`crate::model::AI_TUTOR_USER_ID`]).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, Error>;
}

/// Image generation or lookup for illustrative note media.
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, Error>;
}

/// Durable storage for audio/image blobs referenced by
/// `audio_blob_key`/`recording_blob_key` columns.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), Error>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, Error>;
    async fn delete(&self, key: &str) -> Result<(), Error>;
}

/// Outbound email, used for invitation delivery when a recipient has no
/// account yet.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invitation_email(&self, recipient_email: &str, inviter_display_name: &str) -> Result<(), Error>;
}

/// Push/in-app notification of relationship and session events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_relationship_request(&self, recipient_user_id: crate::model::UserId) -> Result<(), Error>;
}
