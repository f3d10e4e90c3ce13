pub mod appointment;

pub use appointment::{Appointment, Business, PendingAppointment, PushKeys, PushSubscription};
