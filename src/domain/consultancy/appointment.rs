//! Appointments and callback requests
//!
//! The bridge never owns persistence; handlers reach the booking backend
//! through [`AppointmentStore`]. An in-memory store is provided for
//! single-process deployments and tests.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// A booked consultation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Confirmation code given to the caller
    pub id: String,
    pub contact: Contact,
    pub date: NaiveDate,
    pub time: String,
    pub service: String,
    pub fee: String,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A request for a consultant to call back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub id: String,
    pub customer_name: String,
    pub phone_number: String,
    pub inquiry_type: String,
    pub requested_at: DateTime<Utc>,
}

/// Booking backend used by the consultancy handlers
pub trait AppointmentStore: Send + Sync {
    /// Store a confirmed appointment unless its slot is already taken.
    /// Returns false when the slot is taken.
    fn book(&self, appointment: Appointment) -> bool;

    fn get(&self, id: &str) -> Option<Appointment>;

    /// Most recent confirmed appointment for a phone number
    fn find_by_phone(&self, phone: &str) -> Option<Appointment>;

    /// Mark an appointment cancelled, returning its updated record
    fn cancel(&self, id: &str, reason: Option<String>) -> Option<Appointment>;

    /// Times already taken by confirmed appointments on `date`
    fn booked_times(&self, date: NaiveDate) -> Vec<String>;

    fn add_callback(&self, request: CallbackRequest);

    fn callbacks(&self) -> Vec<CallbackRequest>;
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: Mutex<HashMap<String, Appointment>>,
    callbacks: Mutex<Vec<CallbackRequest>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn appointments(&self) -> MutexGuard<'_, HashMap<String, Appointment>> {
        self.appointments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.appointments().len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments().is_empty()
    }
}

impl AppointmentStore for InMemoryAppointmentStore {
    fn book(&self, appointment: Appointment) -> bool {
        let mut appointments = self.appointments();
        let taken = appointments.values().any(|a| {
            a.status == AppointmentStatus::Confirmed
                && a.date == appointment.date
                && a.time == appointment.time
        });
        if taken || appointments.contains_key(&appointment.id) {
            return false;
        }
        appointments.insert(appointment.id.clone(), appointment);
        true
    }

    fn get(&self, id: &str) -> Option<Appointment> {
        self.appointments().get(&id.trim().to_uppercase()).cloned()
    }

    fn find_by_phone(&self, phone: &str) -> Option<Appointment> {
        self.appointments()
            .values()
            .filter(|a| {
                a.status == AppointmentStatus::Confirmed
                    && a.contact.phone.as_deref() == Some(phone)
            })
            .max_by_key(|a| a.created_at)
            .cloned()
    }

    fn cancel(&self, id: &str, reason: Option<String>) -> Option<Appointment> {
        let mut appointments = self.appointments();
        let appointment = appointments.get_mut(&id.trim().to_uppercase())?;
        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancellation_reason = reason;
        Some(appointment.clone())
    }

    fn booked_times(&self, date: NaiveDate) -> Vec<String> {
        self.appointments()
            .values()
            .filter(|a| a.status == AppointmentStatus::Confirmed && a.date == date)
            .map(|a| a.time.clone())
            .collect()
    }

    fn add_callback(&self, request: CallbackRequest) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    fn callbacks(&self) -> Vec<CallbackRequest> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
