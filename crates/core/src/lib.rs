//! Functional core of the clinicsync client data layer.
//!
//! Everything here is synchronous and free of I/O: query keys, cache
//! policy, the reducer-driven Entry Store, eviction planning, invalidation
//! edges, optimistic staging, and the collaborator traits the async shell in
//! `clinicsync_client` is built on.

pub mod cache;
pub mod clinic;
pub mod clock;
pub mod mutation;
pub mod remote;
