//! Domain types and the ports the engine talks through.

pub mod charge;
pub mod customer;
pub mod operation;
pub mod payment_method;
pub mod ports;
pub mod subscription;
