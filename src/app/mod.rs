pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod grpc;
pub mod http;
pub mod telemetry;

pub use config::{GatewayConfig, StatusMapping};
pub use dispatch::Dispatcher;
pub use gateway::Gateway;
