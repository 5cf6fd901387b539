pub mod client;

pub use client::{BitunixClient, BitunixConfig};
