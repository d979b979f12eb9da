//! # mneme-session — Per-session Memory Actors
//!
//! Async layer over `mneme-core`. Each live session owns one actor task
//! that holds its working context, access log and staging area; nothing
//! else touches that state.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 MemoryService                 │
//! │  remember / recall / forget / build_context   │
//! │          │                      │             │
//! │          ▼                      ▼             │
//! │  ┌───────────────┐     ┌────────────────┐     │
//! │  │SessionRegistry│     │RetrievalEngine │     │
//! │  └──────┬────────┘     └───────┬────────┘     │
//! │         ▼                      │              │
//! │  ┌───────────────┐             │              │
//! │  │ session actor │──promote──▶ │              │
//! │  │ (one per id)  │             ▼              │
//! │  └───────────────┘     ┌────────────────┐     │
//! │                        │ LongTermStore  │     │
//! │                        └────────────────┘     │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `service` — the public entry point
//! - `actor` / `registry` — per-session tasks and their handles
//! - `promotion` — moves staged items into the long-term store
//! - `actions` — request validation for remember / recall / forget
//! - `context_builder` — token-budgeted prompt context
//! - `telemetry` — one event per operation, tracing setup

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actions;
pub mod actor;
pub mod context_builder;
pub mod embedding_cache;
pub mod promotion;
pub mod registry;
pub mod service;
pub mod state;
pub mod telemetry;

pub use actions::{
    ForgetOptions, ForgetResponse, RecallRequest, RememberOptions, RememberResponse,
};
pub use actor::{AccessStats, PendingSummary, SessionDeps, SessionHandle};
pub use context_builder::{AssembledContext, ContextBuilder};
pub use embedding_cache::CachedEmbedder;
pub use promotion::{PersistedBatch, PromotionBatch, PromotionEngine, PromotionReport, PromotionTrigger};
pub use registry::SessionRegistry;
pub use service::MemoryService;
pub use state::SessionState;
pub use telemetry::{BufferSink, NoopSink, TelemetryEvent, TelemetrySink, TracingSink, init_tracing};
