// Synaptic Hub
// Command gateway brokering tool calls from many callers to a single execution engine

pub mod baseline;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod retry;
pub mod search;
pub mod server;

pub use catalog::{CapabilityCatalog, CatalogEvent, SelectionOutcome, SelectionRequest};
pub use config::HubConfig;
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionMetadata, OutboundFrame, Role};
pub use correlator::RequestCorrelator;
pub use error::{HubError, HubResult};
pub use gateway::{Gateway, ToolOutput};
pub use registry::{CapabilityDescriptor, CapabilityRegistry, Category, JsonFileRegistry, StaticRegistry};
pub use retry::{CallOutcome, RetryExecutor, RetryPolicy};
