pub mod dispatcher;

pub use dispatcher::{DispatchOutcome, NotificationDispatcher, RetryPolicy};
