//! *Sophos* (C5): the TDP-chain forward-private scheme of §4.4.

mod client;
mod derive;
mod server;
mod wire;

pub use client::SophosClient;
pub use server::SophosServer;
pub use wire::{SearchRequest, SetupMessage, UpdateRequest};
