//! *Diana* (C6): the range-constrained-PRF-tree scheme of §4.5.

pub mod client;
mod derive;
pub mod server;
mod wire;

pub use client::{DianaClient, TREE_DEPTH};
pub use server::DianaServer;
pub use wire::{SearchRequest, SetupMessage, UpdateRequest};
