//! Collaborator traits for the Bronn core
//!
//! This module defines the interfaces of everything the core calls into.
//!
//! - [`SnapshotStore`]: Durable guild configuration and filter rows
//! - [`ChannelSink`]: Delivery of rendered audit blocks to a channel
//! - [`PermissionCheck`]: Whether an actor may mutate guild settings

pub mod channel_sink;
pub mod permission;
pub mod snapshot_store;

pub use channel_sink::{ChannelSink, DeliveryError, RenderedBlock};
pub use permission::{AllowAll, PermissionCheck};
pub use snapshot_store::{GuildConfigStream, SnapshotStore, SnapshotStoreFactory};
