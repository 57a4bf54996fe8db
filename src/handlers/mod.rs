//! Handler modules

pub mod connection;
pub mod events;
pub mod room;
