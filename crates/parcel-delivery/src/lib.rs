// ABOUTME: Delivery side of parcel: the transport that carries artifacts to the operator's chat.
// ABOUTME: Defines the DeliveryClient trait, the bot API implementation, status notifiers, and test doubles.

pub mod bot_api;
pub mod client;
pub mod status;
pub mod testing;

pub use bot_api::{BotApiClient, BotApiConfig};
pub use client::{DeliveryClient, DeliveryError, Payload, UploadKind};
pub use status::{StatusEvent, StatusNotifier, TracingNotifier};
