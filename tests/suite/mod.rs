//! Integration test modules

mod cancellation;
mod keepalive;
mod lifecycle;
mod network;
