pub mod api;
pub mod config;
pub mod counter_store;
pub mod metrics;
pub mod redis_counter_store;
pub mod telemetry;
pub mod ticket_engine;
pub mod ticket_number;

pub use counter_store::{CounterStore, InMemoryCounterStore, StoreError};
pub use redis_counter_store::RedisCounterStore;
pub use ticket_engine::{QueueStatus, TicketEngine, TicketError};
pub use ticket_number::{format_number, TicketNumber};
