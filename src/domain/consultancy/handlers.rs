//! Consultancy functions exposed to the voice agent

use super::appointment::{
    Appointment, AppointmentStatus, AppointmentStore, CallbackRequest, Contact,
};
use super::catalog::{find_service, join_spoken, service_names, VisaService};
use super::schedule::{format_date, match_slot, parse_date, slots_for, weekday_name, OFFICE_HOURS};
use crate::domain::handler::{
    generate_code, payload, Arguments, FieldKind, FieldSpec, HandlerFailure, HandlerResult,
    InputSchema, RegistryBuilder,
};
use crate::domain::shared::Result;
use chrono::{Datelike, Local, NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const CODE_ATTEMPTS: usize = 5;

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Appointment scheduling and visa information for a consultancy office
pub struct Consultancy {
    store: Arc<dyn AppointmentStore>,
    today: fn() -> NaiveDate,
}

impl Consultancy {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            today: local_today,
        }
    }

    /// Use a fixed calendar, for deterministic scheduling
    pub fn with_clock(store: Arc<dyn AppointmentStore>, today: fn() -> NaiveDate) -> Self {
        Self { store, today }
    }

    fn resolve_date(&self, input: &str) -> std::result::Result<NaiveDate, HandlerFailure> {
        parse_date(input, (self.today)()).ok_or_else(|| {
            HandlerFailure::new(
                "invalid_date",
                format!(
                    "I couldn't understand the date '{}'. Could you tell me the day you'd like, for example tomorrow or next Monday?",
                    input
                ),
            )
        })
    }

    fn open_slots(&self, date: NaiveDate) -> std::result::Result<Vec<&'static str>, HandlerFailure> {
        let day = date.weekday();
        let slots = slots_for(day);
        if slots.is_empty() {
            return Err(HandlerFailure::new(
                "closed",
                format!(
                    "I'm sorry, we're closed on {}s. Our office hours are {}. Would you like to check another day?",
                    weekday_name(day),
                    OFFICE_HOURS
                ),
            ));
        }
        let booked = self.store.booked_times(date);
        Ok(slots
            .iter()
            .copied()
            .filter(|slot| !booked.iter().any(|b| b == slot))
            .collect())
    }

    fn lookup_service(&self, input: &str) -> std::result::Result<&'static VisaService, HandlerFailure> {
        find_service(input).ok_or_else(|| {
            HandlerFailure::new(
                "unknown_visa_type",
                format!(
                    "I can help with: {}. Which type of visa are you interested in?",
                    service_names()
                ),
            )
        })
    }

    pub fn get_available_slots(&self, args: &Arguments) -> HandlerResult {
        let date = self.resolve_date(args.require_str("date")?)?;
        let formatted = format_date(date);
        let available = self.open_slots(date)?;
        if available.is_empty() {
            return Err(HandlerFailure::new(
                "fully_booked",
                format!(
                    "I'm sorry, we're fully booked on {}. Would you like to check the next available day?",
                    formatted
                ),
            ));
        }

        let mut message = format!(
            "For {}, we have appointments available at {}.",
            formatted,
            join_spoken(&available)
        );
        let service = args.str("visa_type").and_then(find_service);
        if let Some(service) = service {
            message.push_str(&format!(
                " A {} consultation is {}.",
                service.name, service.consultation_fee
            ));
        }
        message.push_str(" Which time works best for you?");

        Ok(payload(json!({
            "date": formatted,
            "day": weekday_name(date.weekday()),
            "available_slots": available,
            "consultation_fee": service.map(|s| s.consultation_fee),
            "message": message,
        })))
    }

    pub fn book_appointment(&self, args: &Arguments) -> HandlerResult {
        let date = self.resolve_date(args.require_str("date")?)?;
        let service = self.lookup_service(args.require_str("service")?)?;
        let available = self.open_slots(date)?;
        let formatted = format_date(date);

        let time = match args.str("time") {
            Some(requested) => match_slot(requested, date.weekday()).ok_or_else(|| {
                HandlerFailure::new(
                    "invalid_time",
                    format!(
                        "We don't offer a {} slot on {}. Available times are {}.",
                        requested,
                        weekday_name(date.weekday()),
                        join_spoken(slots_for(date.weekday()))
                    ),
                )
            })?,
            None => available.first().copied().ok_or_else(|| {
                HandlerFailure::new(
                    "fully_booked",
                    format!("I'm sorry, we're fully booked on {}.", formatted),
                )
            })?,
        };

        if !available.contains(&time) {
            return Err(slot_unavailable(time, &formatted, &available));
        }

        let contact = Contact {
            name: args.str("customer_name").map(str::to_string),
            phone: args.str("phone_number").map(str::to_string),
        };

        let mut code = generate_code();
        for _ in 1..CODE_ATTEMPTS {
            if self.store.get(&code).is_none() {
                break;
            }
            code = generate_code();
        }

        let appointment = Appointment {
            id: code.clone(),
            contact: contact.clone(),
            date,
            time: time.to_string(),
            service: service.name.to_string(),
            fee: service.consultation_fee.to_string(),
            status: AppointmentStatus::Confirmed,
            cancellation_reason: None,
            created_at: Utc::now(),
        };
        if !self.store.book(appointment) {
            let available = self.open_slots(date)?;
            return Err(slot_unavailable(time, &formatted, &available));
        }

        info!("Appointment booked: {} on {} at {}", code, formatted, time);

        let mut message = format!(
            "Perfect! I've booked your {} consultation for {} at {}. Your confirmation code is {}. The consultation fee is {}, payable at the office.",
            service.name, formatted, time, code, service.consultation_fee
        );
        if let Some(phone) = &contact.phone {
            message.push_str(&format!(" We'll send a confirmation to {}.", phone));
        }
        message.push_str(" Is there anything else I can help you with?");

        Ok(payload(json!({
            "confirmation": code,
            "date": formatted,
            "day": weekday_name(date.weekday()),
            "time": time,
            "service": service.name,
            "fee": service.consultation_fee,
            "message": message,
        })))
    }

    pub fn get_visa_info(&self, args: &Arguments) -> HandlerResult {
        let service = self.lookup_service(args.require_str("visa_type")?)?;
        let highlights: Vec<&str> = service.requirements.iter().take(3).copied().collect();

        let mut message = format!(
            "{}: {} Our consultation fee is {} and typical processing time is {}. Common requirements include {} and more.",
            service.name,
            service.description,
            service.consultation_fee,
            service.processing_time,
            highlights.join(", ")
        );
        if let Some(country) = args.str("destination_country") {
            message.push_str(&format!(
                " Requirements can vary for {}, so I'd recommend booking a consultation for personalized guidance.",
                country
            ));
        }
        message.push_str(" Would you like to schedule a consultation with one of our experts?");

        Ok(payload(json!({
            "visa_type": service.name,
            "description": service.description,
            "consultation_fee": service.consultation_fee,
            "processing_time": service.processing_time,
            "requirements": service.requirements,
            "message": message,
        })))
    }

    pub fn check_appointment(&self, args: &Arguments) -> HandlerResult {
        let found = args
            .str("confirmation_code")
            .and_then(|code| self.store.get(code))
            .or_else(|| {
                args.str("phone_number")
                    .and_then(|phone| self.store.find_by_phone(phone))
            });

        let appointment = found.ok_or_else(|| {
            HandlerFailure::new(
                "not_found",
                "I couldn't find an appointment with those details. Could you please provide your confirmation code or the phone number used for booking?",
            )
        })?;

        let formatted = format_date(appointment.date);
        let who = appointment
            .contact
            .name
            .as_deref()
            .map(|n| format!("{}, you have", n))
            .unwrap_or_else(|| "You have".to_string());
        Ok(payload(json!({
            "confirmation": appointment.id,
            "date": formatted,
            "time": appointment.time,
            "service": appointment.service,
            "appointment_status": appointment.status.as_str(),
            "message": format!(
                "I found your appointment. {} a {} consultation on {} at {}. Status: {}.",
                who, appointment.service, formatted, appointment.time, appointment.status.as_str()
            ),
        })))
    }

    pub fn cancel_appointment(&self, args: &Arguments) -> HandlerResult {
        let code = args.require_str("confirmation_code")?;
        let existing = self.store.get(code).ok_or_else(|| {
            HandlerFailure::new(
                "not_found",
                "I couldn't find an appointment with that confirmation code. Could you please verify the code?",
            )
        })?;
        if existing.status == AppointmentStatus::Cancelled {
            return Err(HandlerFailure::new(
                "already_cancelled",
                "That appointment has already been cancelled. Would you like to book a new time?",
            ));
        }

        let reason = args
            .str("reason")
            .map(str::to_string)
            .unwrap_or_else(|| "Not provided".to_string());
        let cancelled = self
            .store
            .cancel(&existing.id, Some(reason))
            .ok_or_else(|| HandlerFailure::new("not_found", "That appointment no longer exists."))?;

        info!("Appointment cancelled: {}", cancelled.id);

        let formatted = format_date(cancelled.date);
        Ok(payload(json!({
            "confirmation": cancelled.id,
            "appointment_status": cancelled.status.as_str(),
            "message": format!(
                "I've cancelled your {} consultation that was scheduled for {} at {}. If you'd like to reschedule, I'm happy to help you find a new time.",
                cancelled.service, formatted, cancelled.time
            ),
        })))
    }

    pub fn request_callback(&self, args: &Arguments) -> HandlerResult {
        let name = args.require_str("customer_name")?;
        let phone = args.require_str("phone_number")?;
        let reference = generate_code();

        self.store.add_callback(CallbackRequest {
            id: reference.clone(),
            customer_name: name.to_string(),
            phone_number: phone.to_string(),
            inquiry_type: args
                .str("inquiry_type")
                .unwrap_or("General inquiry")
                .to_string(),
            requested_at: Utc::now(),
        });

        info!("Callback requested: {}", reference);

        Ok(payload(json!({
            "reference": reference,
            "message": format!(
                "Thank you, {}. One of our visa consultants will call you at {} within the next 2 business hours. Your reference number is {}.",
                name, phone, reference
            ),
        })))
    }

    /// Register every consultancy function
    pub fn register(self: Arc<Self>, builder: &mut RegistryBuilder) -> Result<()> {
        let this = self.clone();
        builder.register(
            "get_available_slots",
            "Get available consultation slots for a date",
            InputSchema::new()
                .field(
                    FieldSpec::required("date", FieldKind::String)
                        .describe("Date to check, e.g. 'tomorrow', 'Monday' or '2024-05-01'"),
                )
                .field(
                    FieldSpec::optional("visa_type", FieldKind::String)
                        .describe("Visa type the caller is interested in"),
                ),
            move |args: &Arguments| this.get_available_slots(args),
        )?;

        let this = self.clone();
        builder.register(
            "book_appointment",
            "Book a visa consultation appointment",
            InputSchema::new()
                .field(FieldSpec::required("date", FieldKind::String).describe("Appointment date"))
                .field(
                    FieldSpec::required("service", FieldKind::String)
                        .describe("Consultation type, e.g. 'tourist visa'"),
                )
                .field(FieldSpec::optional("time", FieldKind::String).describe("Slot, e.g. '10:00 AM'"))
                .field(FieldSpec::optional("customer_name", FieldKind::String))
                .field(FieldSpec::optional("phone_number", FieldKind::String)),
            move |args: &Arguments| this.book_appointment(args),
        )?;

        let this = self.clone();
        builder.register(
            "get_visa_info",
            "Get fees, processing time and requirements for a visa type",
            InputSchema::new()
                .field(FieldSpec::required("visa_type", FieldKind::String))
                .field(FieldSpec::optional("destination_country", FieldKind::String)),
            move |args: &Arguments| this.get_visa_info(args),
        )?;

        let this = self.clone();
        builder.register(
            "check_appointment",
            "Look up an existing appointment by confirmation code or phone number",
            InputSchema::new()
                .field(FieldSpec::optional("confirmation_code", FieldKind::String))
                .field(FieldSpec::optional("phone_number", FieldKind::String)),
            move |args: &Arguments| this.check_appointment(args),
        )?;

        let this = self.clone();
        builder.register(
            "cancel_appointment",
            "Cancel an existing appointment",
            InputSchema::new()
                .field(FieldSpec::required("confirmation_code", FieldKind::String))
                .field(FieldSpec::optional("reason", FieldKind::String)),
            move |args: &Arguments| this.cancel_appointment(args),
        )?;

        let this = self;
        builder.register(
            "request_callback",
            "Request a callback from a visa consultant",
            InputSchema::new()
                .field(FieldSpec::required("customer_name", FieldKind::String))
                .field(FieldSpec::required("phone_number", FieldKind::String))
                .field(FieldSpec::optional("inquiry_type", FieldKind::String)),
            move |args: &Arguments| this.request_callback(args),
        )?;

        Ok(())
    }
}

fn slot_unavailable(time: &str, date: &str, available: &[&str]) -> HandlerFailure {
    let alternatives = if available.is_empty() {
        "There are no other openings that day.".to_string()
    } else {
        format!("Still open: {}.", join_spoken(available))
    };
    HandlerFailure::new(
        "slot_unavailable",
        format!(
            "I'm sorry, {} on {} is already booked. {}",
            time, date, alternatives
        ),
    )
}
