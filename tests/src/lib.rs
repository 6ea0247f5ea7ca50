//! # bloombox Test Suite
//!
//! Unified test crate covering the cross-crate flows the per-crate unit
//! tests cannot reach:
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Shared fixtures (seeded stores, tracing init)
//! └── integration/      # Cross-crate flows
//!     ├── end_to_end.rs # feed -> scan -> count
//!     ├── persistence.rs# feed -> persist -> restore -> count
//!     └── upscaling.rs  # feed -> scan -> scale to target population
//! ```
//!
//! ## Running
//!
//! ```bash
//! cargo test -p bloombox-tests
//! cargo test -p bloombox-tests integration::
//! cargo bench -p bloombox-tests
//! ```

pub mod integration;
pub mod support;
