//! Resilience utilities: retry with exponential backoff, and a
//! circuit breaker backed by an injectable counter store.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker, CounterStore, InMemoryCounterStore};
pub use retry::RetryManager;
