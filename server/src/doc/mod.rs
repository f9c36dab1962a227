pub mod service;

pub use service::DocAccessService;
