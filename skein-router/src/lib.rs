//! Identity registry and message routing for the Skein substrate.
//!
//! Pure decision logic, no I/O: the [`registry::IdentityRegistry`] tracks
//! loaded identities with their configurations, and the
//! [`router::MessageRouter`] answers, for each inbound or outbound message,
//! which identity handles it, or why it may not.

pub mod config;
pub mod registry;
pub mod router;

pub use config::IdentityConfig;
pub use registry::{IdentityRegistry, LoadedIdentity, RegistryError};
pub use router::{MessageRouter, RouteError};
