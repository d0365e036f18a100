pub mod errors;
pub mod network;
pub mod network_event;
pub mod payload;

#[macro_use]
pub mod macros;
