//! Factor-scoped result caches.
//!
//! A query carries a handful of attributes ("factors"); a script's evaluation
//! is cached under exactly the factors it actually dereferenced. Chains of
//! nested levels, one per touched factor in a fixed canonical order, anchor
//! either in a per-script table invalidated by a global content-modification
//! counter or inside a host object's own scoped side table, whose lifetime the
//! host controls.

mod factor_cache;
mod query;

pub use factor_cache::{CacheId, FactorCache, ModificationClock, ScopedStore};
pub use query::{Factor, FactorKey, FactorSet, FactorValue, QueryDescriptor, QueryInputs};
