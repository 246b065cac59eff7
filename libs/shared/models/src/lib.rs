pub mod appointment;
pub mod auth;
pub mod error;
pub mod payment;
