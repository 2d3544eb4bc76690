//! Message building blocks

pub mod contact;
pub mod headers;
pub mod message;
pub mod method;
pub mod uri;
