//! Core types, the storage trait and the access-control rules for Quire.
//!
//! This crate is deliberately free of HTTP, database and model-inference
//! dependencies. Every other crate depends on it.

pub mod access;
pub mod document;
pub mod embedding;
pub mod error;
pub mod folder;
pub mod folders;
pub mod permission;
pub mod store;
pub mod user;

pub use error::{Error, ErrorKind, Result};
