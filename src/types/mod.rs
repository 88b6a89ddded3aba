pub mod events;
pub mod health;
pub mod ids;
pub mod message;
pub mod options;
pub mod payload;

pub use events::ConsumerEvent;
pub use health::HealthStatus;
pub use ids::MessageId;
pub use message::{Delivery, HeaderValue, Headers, ProviderMetadata, SettleAction, Settlement};
pub use options::{OutgoingMessage, PublishOptions, SeekPosition, SubscribeOptions};
pub use payload::Payload;
