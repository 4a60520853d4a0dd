pub mod memory_store;
pub mod sync_gateway;

pub use memory_store::MemoryStore;
pub use sync_gateway::SyncGatewayClient;
