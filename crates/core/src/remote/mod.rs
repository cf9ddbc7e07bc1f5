mod error;
mod http_mapping;
mod traits;
mod types;

pub use error::{Result, SyncError};
pub use http_mapping::{api_path, status_to_sync_error};
pub use traits::{Fetcher, Mutator};
pub use types::{MutationKind, MutationRequest};
