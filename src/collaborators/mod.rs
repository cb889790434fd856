//! External collaborator contracts for Questline
//!
//! The engine never talks to the outside world directly; it goes through the
//! seams defined here, so deployments can swap implementations and tests can
//! inject mocks.
//!
//! ## Collaborators
//!
//! - **ChainSettlement**: NFT mint and token transfer, returning transaction
//!   identifiers. Ships with `MockChainClient` (fabricated hashes).
//! - **RoleGrant**: best-effort external role assignment (chat platforms).
//!   Ships with `LoggingRoleGrant`.
//! - **PlatformChecker** / **CheckerRegistry**: automatic-mode verification
//!   against external platforms, keyed by platform name.
//! - **ActivityDispatcher**: fire-and-forget activity event emission. Ships
//!   with `NatsActivityPublisher` and an in-memory buffer for tests.

pub mod chain;
pub mod checkers;
pub mod events;
pub mod nats;
pub mod roles;

pub use chain::{ChainSettlement, MockChainClient};
pub use checkers::{CheckerRegistry, PlatformChecker, StaticChecker};
pub use events::{ActivityDispatcher, ActivityEvent, InMemoryDispatcher};
pub use nats::{NatsActivityPublisher, NatsConfig};
pub use roles::{LoggingRoleGrant, RoleGrant};
