//! clinicsync_client - async shell around the clinicsync cache core.
//!
//! [`QueryClient`] owns the Entry Store. The [`Evictor`],
//! [`RefreshScheduler`], [`Prefetcher`] and [`MutationCoordinator`] are
//! explicit instances built on a shared client, each taking its timer and
//! collaborators as constructor arguments.

pub mod cli;
pub mod config;
pub mod error;
pub mod evictor;
pub mod http;
pub mod mutation;
pub mod output;
pub mod persistence;
pub mod prefetch;
pub mod query_client;
pub mod scheduler;
pub mod timer;

pub use config::Config;
pub use error::{ClientError, Result};
pub use evictor::{CleanupReport, Evictor, EvictorSettings};
pub use http::HttpTransport;
pub use mutation::{MutationCoordinator, MutationEvent};
pub use persistence::{FileStateStorage, MemoryStateStorage, Persister, StateStorage};
pub use prefetch::{PrefetchReport, Prefetcher};
pub use query_client::{
    CacheStats, CachedRead, QueryClient, QueryClientOptions, QueryObserver, RefetchReport,
};
pub use scheduler::{refresh_allowed, RefreshScheduler, Refresher};
pub use timer::{CancelToken, ManualTimer, TickFn, Timer, TokioTimer};
