//! Scan orchestration services.

pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod oracle;
pub mod resolver;
pub mod retry;
pub mod suggestion;
pub mod template_document;

#[cfg(test)]
pub(crate) mod stubs;
