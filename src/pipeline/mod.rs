//! Pipeline stages for document parsing.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ linearize ──▶ segment ──▶ assemble ──▶ enrich
//! (bytes)   (stream)      (units)     (chunks)     (images)
//! ```
//!
//! 1. [`input`]     load a path, URL, or byte buffer
//! 2. [`linearize`] flatten a [`crate::model::Document`] into one string
//! 3. [`segment`]   cut the string into text, table, and image units
//! 4. [`assemble`]  pack units into bounded chunks with overlap
//! 5. [`enrich`]    fetch, store, OCR, and caption every image placeholder;
//!    the only stage with bounded concurrency
//!
//! Helpers used by enrichment: [`fetch`] resolves image bytes, [`llm`] drives
//! VLM calls with retry/backoff, [`encode`] and [`postprocess`] prepare the
//! request and clean the answer.

pub mod assemble;
pub mod encode;
pub mod enrich;
pub mod fetch;
pub mod input;
pub mod linearize;
pub mod llm;
pub mod postprocess;
pub mod segment;
