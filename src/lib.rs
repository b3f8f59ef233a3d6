//! `mailindex` — a threaded mail indexing engine.
//!
//! This crate ingests individual message files (one RFC 5322 message per
//! file, maildir-style) into a persistent index, linking each message into
//! its conversation thread as it arrives. A *thread* is the transitive
//! closure of the reply relation carried by the `References` and
//! `In-Reply-To` headers; messages may arrive in any order, and threads
//! that later turn out to be the same conversation are merged on the fly.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod store;
pub mod thread;
