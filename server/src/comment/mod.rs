pub mod gateway;
pub mod notifications;

pub use gateway::{CommentPosted, CommentThreadGateway};
