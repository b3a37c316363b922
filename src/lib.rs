// src/lib.rs

//! pacshadow
//!
//! Unprivileged package database mirror and upgrade resolution. Keeps a
//! private shadow of a system package database so repository metadata can
//! be refreshed without root, then answers what a full upgrade would do.
//!
//! # Architecture
//!
//! - Mirror: `local` symlinked to the real database, `sync` copied with
//!   staleness markers so unchanged files are not copied twice
//! - Engine: every dependency-resolution need goes through the `Engine` trait
//! - Session: caller-owned state replacing process-wide handles
//! - Resolver: upgrade, watched and foreign package queries

pub mod config;
pub mod engine;
mod error;
pub mod mirror;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod sync;
pub mod version;

pub use error::{Error, Result};
