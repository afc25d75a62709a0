//! Record store contract and the in-memory implementation.

mod event;
mod memory;
mod traits;

pub use event::StoreEvent;
pub use memory::MemoryStore;
pub use traits::RecordStore;
