//! Visa consultancy functions: scheduling, service information and callbacks

pub mod appointment;
pub mod catalog;
pub mod handlers;
pub mod schedule;

pub use appointment::{
    Appointment, AppointmentStatus, AppointmentStore, CallbackRequest, Contact,
    InMemoryAppointmentStore,
};
pub use catalog::{find_service, VisaService};
pub use handlers::Consultancy;
