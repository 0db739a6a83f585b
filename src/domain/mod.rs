//! Domain types and the ports through which the engine reaches its data.

pub mod change;
pub mod health;
pub mod order;
pub mod ports;
pub mod status;
pub mod transaction;
