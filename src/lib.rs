//! Multi-tenant agent orchestration core (see `SPEC_FULL.md`): LLM routing with health-tracked
//! failover, a declarative workflow interpreter, cron/event scheduling, and keyword-based chat
//! handoff. The HTTP/CRUD surface, auth, billing, and concrete tool adapters are external
//! collaborators — this crate only defines the interfaces they plug into.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod handoff;
pub mod providers;
pub mod routing;
pub mod scheduler;
pub mod store;
pub mod tool;
pub mod workflow;

pub use config::Settings;
pub use error::ConduitError;
pub use store::{InMemoryStore, LedgerBackedStore, Store};
pub use workflow::Interpreter;
