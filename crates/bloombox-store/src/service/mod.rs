//! Service layer: feeding orchestration

pub mod feeder;

pub use feeder::Feeder;
