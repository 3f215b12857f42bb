//! # Quality Harness
//!
//! Semantic table discovery and data-quality assessment for SQL and
//! flat-file sources.
//!
//! Quality Harness catalogs the tables of each configured source, embeds a
//! text description of every table into a local index, and answers
//! natural-language questions like "is the staging customers table clean?"
//! by ranking candidate tables and running data-quality checks against the
//! best one.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Connectors  │──▶│  Catalog    │──▶│  Embedding   │
//! │ CSV/SQLite  │   │  Builder    │   │  Index       │
//! └──────┬──────┘   └─────────────┘   └──────┬───────┘
//!        │                                   ▼
//!        │          ┌─────────────┐   ┌──────────────┐
//!        └─────────▶│ Assessment  │◀──│  Relevance   │
//!                   │ + Checks    │   │  Ranker      │
//!                   └──────┬──────┘   └──────────────┘
//!                          ▼
//!                   ┌─────────────┐
//!                   │  Reports    │
//!                   │ md/html/json│
//!                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dqh init                                  # create the index database
//! dqh index warehouse                       # catalog and embed a source
//! dqh search "staging customers"            # rank tables
//! dqh assess main.customers --source warehouse --save
//! dqh serve                                 # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Table descriptors, indexed documents, ranked hits |
//! | [`frame`] | In-memory tabular data |
//! | [`connector`] | Connector trait, registry and in-memory connector |
//! | [`connector_csv`] | Flat-file (CSV) connector |
//! | [`connector_sqlite`] | SQLite connector |
//! | [`catalog`] | Metadata catalog builder |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait with SQLite and in-memory backends |
//! | [`index`] | Embedding index with atomic rebuilds |
//! | [`ranker`] | Heuristic re-ranking and connector inference |
//! | [`checks`] | Data-quality checks |
//! | [`assessment`] | Check execution and aggregation |
//! | [`recommend`] | Recommendations derived from check results |
//! | [`report`] | Markdown, HTML and JSON rendering |
//! | [`harness`] | Library facade used by the CLI and server |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assessment;
pub mod catalog;
pub mod checks;
pub mod config;
pub mod connector;
pub mod connector_csv;
pub mod connector_sqlite;
pub mod db;
pub mod embedding;
pub mod error;
pub mod frame;
pub mod harness;
pub mod index;
pub mod migrate;
pub mod models;
pub mod ranker;
pub mod recommend;
pub mod report;
pub mod server;
pub mod sources;
pub mod store;

pub use error::{QualityError, Result};
pub use harness::Harness;
