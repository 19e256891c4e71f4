/// In-memory room store.
pub mod memory;
/// Room repository contract and its errors.
pub mod room_store;
