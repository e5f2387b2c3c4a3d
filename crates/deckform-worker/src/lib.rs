//! Deckform Worker Library
//!
//! The ingestion pool (claims confirmed uploads, decomposes decks into
//! slides, runs analysis) and the reconciliation loop (reaps stale claims,
//! re-announces lost jobs, expires stale upload grants).

pub mod analyzer;
pub mod deck;
pub mod pool;
pub mod reconcile;

pub use analyzer::{KeywordAnalyzer, SlideAnalysis, SlideAnalyzer};
pub use deck::{decompose, SlideContent};
pub use pool::{IngestContext, IngestPool, IngestPoolConfig, CANCELLED_REASON};
pub use reconcile::Reconciler;
