//! # mediadex
//!
//! A single-flight, resumable media indexer for chat message histories.
//!
//! mediadex walks a chat history backwards from a starting message, picks
//! out videos, audio files and documents, and stores their metadata in a
//! deduplicated SQLite index. It honours the upstream's rate-limit signals,
//! reports live progress, and can be cancelled and resumed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────┐   ┌──────────┐
//! │ History      │──▶│ IndexingCoordinator   │──▶│  SQLite  │
//! │ export / API │   │ fetch→classify→persist│   │  media   │
//! └──────────────┘   └───────────┬───────────┘   └──────────┘
//!                                ▼
//!                        ┌──────────────┐
//!                        │   Progress   │
//!                        │ stderr/JSON  │
//!                        └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mdx init                                   # create database
//! mdx resolve https://t.me/filmarchive/1520  # check a link
//! mdx index https://t.me/filmarchive/1520    # index from message 1520 down
//! mdx index --resume                         # continue an interrupted job
//! mdx stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Fetch, persist and caller-facing errors |
//! | [`links`] | Deep link and forward resolution |
//! | [`classify`] | Media classification |
//! | [`traits`] | History, persister and checkpoint interfaces |
//! | [`fetcher`] | Rate-limited batch fetching |
//! | [`backoff`] | Rate-limit backoff |
//! | [`progress`] | Progress snapshots and reporters |
//! | [`ingest`] | Indexing coordinator |
//! | [`connector_export`] | Chat export history source |
//! | [`store`] | SQLite media store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`stats`] | Index statistics |

pub mod backoff;
pub mod classify;
pub mod config;
pub mod connector_export;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod links;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod stats;
pub mod store;
pub mod traits;
