//! Operation entry boundary: routing and error mapping.

pub mod dispatch;
pub mod error;
