//! # refdex
//!
//! A Markdown reference-documentation indexer with token-budgeted
//! retrieval for AI tools.
//!
//! refdex splits a tree of Markdown files into heading-delimited sections,
//! builds an inverted index over them and answers queries with the most
//! relevant sections that fit a caller's token budget, so a model gets the
//! three paragraphs it needs instead of the whole manual.
//!
//! The indexing and ranking logic lives in [`refdex_core`]; this crate adds
//! the filesystem, the CLI and the HTTP service around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Corpus    │──▶│   Pipeline   │──▶│   Snapshot   │
//! │ walk + glob │   │ segment+index│   │ (JSON file)  │
//! └─────────────┘   └──────┬───────┘   └──────┬───────┘
//!                          │                  │
//!                          ▼                  ▼
//!                   ┌────────────┐      ┌──────────┐
//!                   │  Service   │      │   CLI    │
//!                   │   (HTTP)   │      │ (index)  │
//!                   └────────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! index build ./docs ./docs.idx
//! index query ./docs.idx --q "istio mtls rotation" --budget 800
//! index serve ./docs --bind 127.0.0.1:7340
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Filesystem corpus discovery |
//! | [`pipeline`] | Parallel build pipeline |
//! | [`persist`] | Atomic snapshot files |
//! | [`query`] | `query` / `rank` commands and response types |
//! | [`stats`] | Snapshot statistics |
//! | [`service`] | Build-then-publish retrieval service |
//! | [`server`] | HTTP API |
//! | [`progress`] | Build progress reporting |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod corpus;
pub mod logging;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod server;
pub mod service;
pub mod stats;
