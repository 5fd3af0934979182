//! Policy abstractions for dispatch.
//!
//! - [`RetryPolicy`]: how many times one recipient is attempted and how long to
//!   wait in between
//! - [`SendOutcome`]: the settled result of a recipient's retry loop

pub mod retry;

pub use retry::{RetryPolicy, SendOutcome, SendStep};
