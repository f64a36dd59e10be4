//! Notification sender implementations.

pub mod logging;

pub use logging::LoggingNotificationSender;
