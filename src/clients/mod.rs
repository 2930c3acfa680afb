//! Embedding clients module.

pub mod huggingface;

pub use huggingface::HuggingFaceClient;
