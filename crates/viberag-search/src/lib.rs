//! viberag-search: embedding providers, the batch orchestrator, the
//! vector+FTS store, the incremental indexing service, and the hybrid
//! search engine (spec §4.6-§4.10).

pub mod embeddings;
pub mod error;
pub mod indexer;
pub mod orchestrator;
pub mod search;
pub mod store;

pub use embeddings::{EmbeddingProvider, ProviderKind};
pub use error::{Result, SearchError};
pub use indexer::{IndexOptions, IndexPhase, IndexStats, Indexer};
pub use search::{
    ContextNeighbor, NextAction, RefHit, SearchEngine, SearchFilters, SearchHit, SearchMode, SearchOptions, SearchResults, SymbolDetail,
};
pub use store::Store;
