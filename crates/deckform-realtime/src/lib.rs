//! Deckform Realtime Library
//!
//! The notification hub (per-tenant, per-user live connections with lossy
//! fan-out) and the collaboration coordinator (per-assembly mutation
//! serialization). The hub's connection set is the only authoritative state
//! held purely in memory, and it is explicitly disposable: clients
//! resynchronize by pulling after reconnect.

pub mod coordinator;
pub mod hub;
pub mod locks;

pub use coordinator::{CollaborationCoordinator, MutationOutcome};
pub use hub::{NotificationHub, SubscriptionHandle};
pub use locks::AssemblyLocks;
