//! Transport adapters for the relay's capability traits.

#[cfg(test)]
pub mod mock;
pub mod webtransport;
