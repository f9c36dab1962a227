pub mod access;
pub mod comment;
pub mod config;
pub mod document;
pub mod identity;
pub mod ids;
pub mod memory;
pub mod notification;
pub mod policy;
pub mod presence;
