//! Service layer: scan execution and upscaling

pub mod engine;
pub mod upscaler;
