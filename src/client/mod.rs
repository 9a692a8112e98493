pub mod binding;
pub mod dispatcher;
pub mod experiment;
pub mod keepalive;
pub mod stats;

pub use binding::{Outcome, ProtocolBinding};
pub use dispatcher::Dispatcher;
pub use experiment::Experiment;
pub use keepalive::{Binding, SessionKeepAlive};
pub use stats::{DeliveryReport, Stats};
