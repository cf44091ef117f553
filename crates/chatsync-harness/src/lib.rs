//! Deterministic simulation harness for chatsync testing.
//!
//! Virtual-time implementations of the core seams so connection lifecycles and
//! timeline reconciliation can be replayed exactly from a seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the common
//! timeline and backoff invariants.
//!
//! # Scripted Sockets
//!
//! [`SimSocket`] executes the actions of a core `Connection` against an
//! in-memory socket whose opens, frames, errors, and closes the test scripts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_socket;

pub use invariants::{
    BackoffBounded, Invariant, InvariantRegistry, InvariantResult, PendingEntriesAreMine,
    SystemSnapshot, TimelineScopedToActiveRoom, UniqueMessageIds, Violation,
};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_socket::SimSocket;
