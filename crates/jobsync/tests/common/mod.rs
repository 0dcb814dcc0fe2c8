//! Shared utilities for jobsync integration tests.
//!
//! - `TestHarness`: temp storage root, in-memory database, manual clock and
//!   a reconciler wired to them
//! - `ScriptedClient`: a `JobClient` answering from canned responses
//! - Builders for jobs and archive payloads

pub mod builders;
pub mod client;
pub mod harness;

pub use builders::*;
pub use client::ScriptedClient;
pub use harness::TestHarness;
