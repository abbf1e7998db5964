//! # Member Chat
//!
//! An LLM-orchestrated chat pipeline that answers either free-form
//! questions or questions about a stored member.
//!
//! A locally hosted model classifies each query. Member questions have their
//! identifier extracted, get an audit SQL statement drafted and validated,
//! resolve the member through a parameterized store lookup and are rendered
//! from the retrieved fields. Everything else goes straight to the model as
//! general chat.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   query ──────▶ │    intent    │── GENERAL_CHAT ──▶ model ──▶ text
//!                 └──────┬───────┘
//!                        │ DATABASE_QUERY
//!                        ▼
//!   extract ─▶ synth ─▶ validate ─▶ executor ─▶ format ──▶ text
//!                                      │
//!                                ┌─────┴─────┐
//!                                │   store   │ SQLite / in-memory
//!                                └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mchat init                              # create database
//! mchat seed ./data/members.json          # load members
//! mchat ask "What's member 123's phone?"  # one-shot query
//! mchat serve                             # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed pipeline errors |
//! | [`inference`] | Model client abstraction and Ollama client |
//! | [`schema`] | Schema description shown to the model |
//! | [`intent`] | Intent classification |
//! | [`extract`] | Member id / name extraction |
//! | [`synth`] | SQL drafting |
//! | [`validate`] | SQL safety policy |
//! | [`executor`] | Member resolution |
//! | [`format`] | Response rendering |
//! | [`orchestrator`] | The chat state machine |
//! | [`store`] | Record store abstraction and backends |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`seed`] | Fixture loading |
//! | [`get`] | Member retrieval by ID |

pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod extract;
pub mod format;
pub mod get;
pub mod inference;
pub mod intent;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod schema;
pub mod seed;
pub mod server;
pub mod store;
pub mod synth;
pub mod validate;
