// # bronn-core
//
// Guild configuration cache and audit-diff logging pipeline of the Bronn
// moderation bot.
//
// ## Architecture Overview
//
// - **SnapshotStore**: Trait for the durable guild config and filter rows
// - **GuildConfigCache** / **FilterCache**: Write-through in-memory mirrors
//   of the store
// - **diff**: Pure structural diff of entity snapshots
// - **SuppressionLedger**: Skip-once entries for the bot's own actions
// - **AuditRouter**: Resolves, renders and delivers audit records
// - **ModLog**: Translates platform events into audit records
// - **GuildSettings**: Permission-checked configuration commands
// - **StoreRegistry**: Name to factory table for snapshot stores
//
// ## Initialization Order
//
// 1. Snapshot store (via `StoreRegistry`)
// 2. Caches over the store, then `GuildConfigCache::bulk_load`
// 3. Suppression ledger and its sweeper
// 4. Audit router over the config cache, ledger and a `ChannelSink`
// 5. `ModLog` and `GuildSettings` over the router and caches
//
// ## Design Principles
//
// 1. **Store First**: The cache changes only after the store accepted a write
// 2. **Never Fail a Read**: Unknown guilds read as default-configured
// 3. **Audit Is Best Effort**: Routing returns outcomes, never errors
// 4. **Library-First**: The daemon only wires these pieces together

pub mod audit;
pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod model;
pub mod modlog;
pub mod registry;
pub mod settings;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use audit::{AuditBody, AuditOutcome, AuditRecord, AuditRouter, EventKind, SuppressionLedger};
pub use cache::{ConfigField, FilterCache, FilterChange, GuildConfigCache};
pub use config::{AuditConfig, BronnConfig, StoreConfig, SuppressionConfig};
pub use diff::{ChangeDetail, ChangeRecord, EntityKind, Snapshot, diff};
pub use error::{Error, Result};
pub use events::PlatformEvent;
pub use model::{ChannelId, EntityId, FilterRecord, GuildConfigRecord, GuildId, LogCategory};
pub use modlog::ModLog;
pub use registry::StoreRegistry;
pub use settings::GuildSettings;
pub use store::{FileStore, MemoryStore};
pub use traits::{ChannelSink, DeliveryError, PermissionCheck, RenderedBlock, SnapshotStore};
