pub mod comment;
pub mod doc;
pub mod error;
pub mod handlers;
pub mod notification;
pub mod observability;
pub mod presence;
pub mod remote;
pub mod router;
pub mod state;
pub mod types;
pub mod user;
pub mod utils;

pub use error::{AppError, ErrorKind};
pub use state::{AppState, Backends, BackendKind, build_state};

#[cfg(test)]
pub mod test_support;
