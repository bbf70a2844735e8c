pub mod types;
pub mod slot_utils;
pub mod occurrences;
pub mod flow;

pub use types::{Appointment, ClassData, ClassesData, CreateAppointment, MeetingType, Questions, Slot, UserAppointmentsByOccurrence};
pub use occurrences::{enrollment_cancellation_allowed, index_appointments, occurrence_views, OccurrenceView};
pub use flow::{BookingFlow, FlowStep, FlowView, MeetingContext, SlotTicket};
