mod classes;
mod types;

pub use classes::{Collection, EntityClass, ParseNameError, Role};
pub use types::{
    Client, Consultation, ConsultationStatus, Session, SessionStatus, Therapist,
};
