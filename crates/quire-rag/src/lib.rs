//! Ingestion, retrieval and answer generation for Quire.
//!
//! Everything here is generic over a [`quire_core::store::DocumentStore`] and
//! talks to the outside world through three seams: [`model::Embedder`],
//! [`model::Completer`] and [`blob::BlobStore`].

pub mod blob;
pub mod chunk;
pub mod extract;
pub mod ingest;
pub mod model;
pub mod openai;
pub mod reformulate;
pub mod retrieval;
pub mod service;
pub mod settings;
pub mod types;

pub use ingest::Ingestor;
pub use service::RagService;
pub use settings::{ModelSettings, RagSettings};

#[cfg(test)]
mod tests;
