mod factory;
mod nats_publisher;

pub use factory::NatsPublisherFactory;
pub use nats_publisher::{NatsPublisher, NatsPublisherConfig};
