//! Pure functions mapping query keys to API paths and HTTP statuses to
//! [`SyncError`] variants.

use crate::cache::QueryKey;
use crate::clinic::EntityClass;

use super::SyncError;

fn resource(class: EntityClass) -> &'static str {
    match class {
        EntityClass::Client => "clients",
        EntityClass::Therapist => "therapists",
        EntityClass::Session => "sessions",
        EntityClass::Consultation => "consultations",
        EntityClass::Clinic => "clinics",
        EntityClass::Profile => "profiles",
        EntityClass::Analytics => "analytics",
    }
}

/// Returns the REST path serving a query key.
///
/// # Examples
///
/// ```
/// use clinicsync_core::cache::{client_list_key, client_sessions_key};
/// use clinicsync_core::remote::api_path;
///
/// assert_eq!(api_path(&client_list_key()), "/api/clients");
/// assert_eq!(api_path(&client_sessions_key("42")), "/api/clients/42/sessions");
/// ```
pub fn api_path(key: &QueryKey) -> String {
    let mut path = format!("/api/{}", resource(key.class()));
    for segment in key.segments() {
        path.push('/');
        path.push_str(segment);
    }
    path
}

/// Maps a non-success HTTP status to a [`SyncError`].
///
/// - 404 / 410 -> `NotFound`
/// - 400 / 422 -> `Validation`
/// - 409 / 412 -> `Conflict`
/// - anything else -> `Network`
pub fn status_to_sync_error(status: u16, key: &QueryKey, message: &str) -> SyncError {
    match status {
        404 | 410 => SyncError::NotFound {
            entity_type: key.class().entity_type(),
            id: key
                .entity_id()
                .map(str::to_string)
                .unwrap_or_else(|| key.to_string()),
        },
        400 | 422 => SyncError::Validation(message.to_string()),
        409 | 412 => SyncError::Conflict(message.to_string()),
        _ => SyncError::Network(format!("HTTP {}: {}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{analytics_key, client_key, session_list_key};

    #[test]
    fn test_entity_path() {
        assert_eq!(api_path(&client_key("42")), "/api/clients/42");
        assert_eq!(api_path(&analytics_key("monthly")), "/api/analytics/monthly");
    }

    #[test]
    fn test_404_maps_to_not_found() {
        let error = status_to_sync_error(404, &client_key("42"), "gone");
        assert_eq!(
            error,
            SyncError::NotFound {
                entity_type: "Client",
                id: "42".to_string()
            }
        );
    }

    #[test]
    fn test_404_on_list_uses_key_as_id() {
        let error = status_to_sync_error(404, &session_list_key(), "gone");
        assert_eq!(error.to_string(), "Session not found: session");
    }

    #[test]
    fn test_validation_statuses() {
        for status in [400, 422] {
            assert!(matches!(
                status_to_sync_error(status, &client_key("1"), "bad"),
                SyncError::Validation(_)
            ));
        }
    }

    #[test]
    fn test_conflict_statuses() {
        for status in [409, 412] {
            assert!(matches!(
                status_to_sync_error(status, &client_key("1"), "stale"),
                SyncError::Conflict(_)
            ));
        }
    }

    #[test]
    fn test_server_errors_are_network() {
        let error = status_to_sync_error(503, &client_key("1"), "unavailable");
        assert_eq!(error.to_string(), "Network error: HTTP 503: unavailable");
        assert!(error.is_retryable());
    }
}
