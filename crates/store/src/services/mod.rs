//! Business logic built on the repositories.
//!
//! - [`orders`] - Order placement and the status lifecycle
//! - [`verification`] - Single-use expiring codes
//! - [`accounts`] - Registration, login, email verification, password reset
//! - [`notifier`] - Outbound customer notifications

pub mod accounts;
pub mod notifier;
pub mod orders;
pub mod verification;

pub use accounts::{AccountError, Accounts};
pub use notifier::{LogNotifier, Notification, Notifier, NotifyError, Template};
pub use orders::{OrderError, OrderLifecycle, StatusChange, Transition};
pub use verification::{IssuedCode, RedeemError, VerificationCodes};
