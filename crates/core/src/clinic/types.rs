use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A client receiving care at a clinic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub clinic_id: String,
    /// Assigned therapist, if any.
    pub therapist_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    /// Treatment progress as a percentage (0-100).
    pub progress: u8,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Creates a new client with zero progress.
    pub fn new(
        id: impl Into<String>,
        clinic_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            clinic_id: clinic_id.into(),
            therapist_id: None,
            name: name.into(),
            email: None,
            progress: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_therapist(mut self, therapist_id: impl Into<String>) -> Self {
        self.therapist_id = Some(therapist_id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the progress, clamped to 100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    /// Sets a specific update timestamp (useful for testing).
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }
}

/// A therapist employed by a clinic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Therapist {
    pub id: String,
    pub clinic_id: String,
    pub name: String,
    pub specialty: Option<String>,
}

impl Therapist {
    pub fn new(
        id: impl Into<String>,
        clinic_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            clinic_id: clinic_id.into(),
            name: name.into(),
            specialty: None,
        }
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }
}

/// Lifecycle state of a therapy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    /// Returns true once the session can no longer change.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::NoShow
        )
    }
}

/// A scheduled therapy session between a client and a therapist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub client_id: String,
    pub therapist_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: SessionStatus,
    pub notes: Option<String>,
}

impl Session {
    /// Creates a scheduled 50-minute session.
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        therapist_id: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            therapist_id: therapist_id.into(),
            scheduled_at,
            duration_minutes: 50,
            status: SessionStatus::Scheduled,
            notes: None,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// State of an intake consultation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Requested,
    Confirmed,
    Completed,
    Declined,
}

/// An intake consultation, usually preceding the first session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: String,
    pub client_id: String,
    pub therapist_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub status: ConsultationStatus,
    pub reason: Option<String>,
}

impl Consultation {
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            therapist_id: None,
            requested_at,
            status: ConsultationStatus::Requested,
            reason: None,
        }
    }

    pub fn with_therapist(mut self, therapist_id: impl Into<String>) -> Self {
        self.therapist_id = Some(therapist_id.into());
        self
    }

    pub fn with_status(mut self, status: ConsultationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
