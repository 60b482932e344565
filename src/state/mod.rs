/// State management module
///
/// This module handles all application state, including:
/// - Shared data structures and cache projections (data.rs)
/// - The quota-bounded local cache slot (cache.rs)
/// - Filters and the album lightbox (filter.rs)
/// - The canonical record list and its reconciliation (reconciler.rs)

pub mod cache;
pub mod data;
pub mod filter;
pub mod reconciler;
