//! kubinet: a small personal website served by a single binary.
//!
//! The crate is layered the usual way: `domain` holds records and invariants,
//! `application` holds the services (markdown rendering, the authoring gate,
//! sessions, content access), `infra` holds adapters (Postgres, hosted auth,
//! client storage, HTTP), and `presentation` holds the askama views.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod util;
