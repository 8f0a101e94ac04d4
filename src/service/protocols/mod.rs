//! One [`super::ServiceProtocol`] implementation per
//! [`crate::config::ServiceKind`] variant.

pub mod relay;
pub mod semtech;

#[cfg(feature = "mqtt")]
pub mod mqtt;
