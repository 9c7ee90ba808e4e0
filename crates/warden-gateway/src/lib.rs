pub mod audit;
pub mod coalescer;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod server;

pub use coalescer::OutputCoalescer;
pub use registry::ApprovalRegistry;
pub use server::{GatewayConfig, GatewayServer};
