//! keepstack-engine: incremental scroll-driven collection engine.
//!
//! Drives an infinite-scroll page (live or simulated, behind the `Page`
//! trait), extracts candidate records each round via an injected `Extractor`,
//! merge-deduplicates them in memory, and streams new or changed records to a
//! `MergeStore` in bounded batches. Supports cooperative mid-run cancellation
//! with partial-result durability and a multi-folder orchestrator for the
//! saved-post mode.

pub mod cancel;
pub mod convergence;
pub mod dispatcher;
pub mod engine;
pub mod normalize;
pub mod orchestrator;
pub mod scroller;
pub mod service;
pub mod sim_adapter;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

#[cfg(test)]
mod orchestrator_tests;

pub use cancel::{RunRegistry, StopToken};
pub use engine::{CollectEngine, EngineResult};
pub use service::{CollectionService, RunOutcome, StopOutcome};
pub use stats::{EngineMeta, RunMeta, TargetMeta};
pub use traits::{Extractor, MergeStore, Page, Surface};
