//! # Coaching KB
//!
//! A knowledge-base ingestion and retrieval pipeline that grounds AI
//! technique analysis in a curated library of coaching documents.
//!
//! Coaching PDFs are split into semantically coherent passages, embedded
//! into fixed-dimension vectors, and stored in SQLite. At query time the
//! most similar passages are retrieved under sport/category/technique
//! filters and assembled into a grounding context block for a downstream
//! generation prompt.
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │   PDFs   │──▶│ extract → chunk → embed   │──▶│  SQLite   │
//! │ (add)    │   │ (processor state machine) │   │ chunks+vec│
//! └──────────┘   └──────────────────────────┘   └────┬─────┘
//!                                                    │
//!                                 ┌──────────────────┤
//!                                 ▼                  ▼
//!                          ┌────────────┐     ┌────────────┐
//!                          │ retriever  │────▶│  context   │
//!                          │ (filters)  │     │ (grounding)│
//!                          └────────────┘     └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed pipeline errors |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`extract`] | PDF text extraction |
//! | [`chunker`] | Passage chunking and classification |
//! | [`embedding`] | Embedding client with rate-limit handling |
//! | [`processor`] | Document processing state machine |
//! | [`retriever`] | Filtered similarity retrieval |
//! | [`context`] | Grounding-context assembly |

pub mod chunker;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod migrate;
pub mod models;
pub mod processor;
pub mod retriever;
