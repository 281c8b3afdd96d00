pub mod citation_cache;

pub use citation_cache::CitationCountCache;
