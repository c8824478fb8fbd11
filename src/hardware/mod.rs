//! # Hub Implementations
//!
//! Adapters behind the [`Hub`](crate::domain::Hub) port and the factory that
//! picks one from configuration.

pub mod factory;
pub mod home_assistant;

pub use factory::{create_hub, HubFactory};
pub use home_assistant::HomeAssistantHub;
