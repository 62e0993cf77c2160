//! *Janus* (C7): a *Sophos*-derived composition of two *Diana* cores plus
//! puncturable encryption (C1), giving backward privacy (§4.6).

mod client;
mod diana_core;
mod payload;
mod server;
mod wire;

pub use client::JanusClient;
pub use server::JanusServer;
pub use wire::{DeleteRequest, InsertRequest, SearchRequest};
