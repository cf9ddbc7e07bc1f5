mod entry;
mod eviction;
mod invalidation;
mod keys;
mod patterns;
mod persisted;
mod policy;
mod prefetch;
mod serialization;
mod store;

pub use entry::{Entry, IssueStamp};
pub use eviction::{
    plan_eviction, threshold_bytes, EvictionPlan, DEFAULT_MAX_SIZE_BYTES,
    DEFAULT_THRESHOLD_PERCENT,
};
pub use invalidation::{
    dependents_of, invalidation_patterns, role_invalidation_patterns, Dependent,
    InvalidationEdge, INVALIDATION_EDGES,
};
pub use keys::{
    analytics_key, client_consultations_key, client_key, client_list_key, client_sessions_key,
    clinic_clients_key, clinic_therapists_key, collection_key, consultation_key,
    consultation_list_key, entity_key, is_temp_id, list_key, profile_key, session_key,
    session_list_key, temp_id, therapist_clients_key, therapist_key, therapist_list_key,
    therapist_sessions_key, QueryKey,
};
pub use patterns::{key_matches, pattern_matches};
pub use persisted::{
    PersistedEntry, PersistedState, Selections, SortDirection, SortSpec,
    PERSISTED_STATE_VERSION,
};
pub use policy::{policy_for, CachePolicy, CacheTier};
pub use prefetch::prefetch_targets;
pub use serialization::{
    decode_data, deserialize_state, estimate_size, serialize_state, Result, SerializationError,
};
pub use store::{EntryStore, ObserverDelta, StoreAction};
