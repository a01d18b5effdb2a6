#[allow(clippy::module_inception)]
mod client;

pub use client::{Lido, LidoOptions};
