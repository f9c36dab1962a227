pub mod service;

pub use service::{CurrentUser, UserService};
