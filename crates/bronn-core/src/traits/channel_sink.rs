// # Channel Sink Trait
//
// Defines the interface for delivering a rendered audit block to a
// platform channel.
//
// Sinks are single-shot: one call, one delivery attempt. The router never
// retries and never propagates a sink failure, so a sink must not retry
// either.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ChannelId;

/// A bounded audit block ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedBlock {
    /// Short heading, e.g. "Channel updated"
    pub title: String,
    /// Body text, never longer than the router's configured cap
    pub body: String,
    /// Optional image reference (avatar, guild icon)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Optional footer line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    /// When the logged event happened
    pub timestamp: DateTime<Utc>,
}

/// Why a sink rejected a block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Destination channel no longer exists
    #[error("channel not found")]
    NotFound,

    /// The bot may not post in the destination channel
    #[error("missing permission to post")]
    Forbidden,

    /// Network or gateway failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Trait for channel sink implementations
#[async_trait]
pub trait ChannelSink: Send + Sync {
    /// Deliver one block to one channel
    async fn deliver(
        &self,
        channel_id: ChannelId,
        block: &RenderedBlock,
    ) -> Result<(), DeliveryError>;
}
