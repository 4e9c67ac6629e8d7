//! Wire and domain models shared by both transports.

pub mod finding;
pub mod request;
pub mod response;
pub mod template;
