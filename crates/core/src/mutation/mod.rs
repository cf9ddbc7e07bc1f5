mod ledger;
mod staging;
mod types;

pub use ledger::PendingMutations;
pub use staging::{merge_patch, tentative_data};
pub use types::{MutationState, OptimisticUpdate};
