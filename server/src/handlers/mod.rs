// HTTP handlers module structure

pub(crate) mod comment_handlers;
pub(crate) mod doc_handlers;
pub(crate) mod health_handlers;
pub(crate) mod notification_handlers;
pub(crate) mod presence_handlers;
