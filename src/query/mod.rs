//! Remote query layer: expression builders, wire types, the transport seam
//! and the paginating client on top of it.

mod client;
pub mod expression;
mod transport;
pub mod types;

pub use client::{PaginationMode, QueryClient, QueryStats};
pub use expression::{BatchKind, ChainLimits};
pub use transport::{HttpTransport, SearchTransport};
pub use types::{Entity, EvaluateRequest, EvaluationResult, HistogramRequest, HistogramResult};
