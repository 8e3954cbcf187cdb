//! Vigil Session Model
//!
//! Defines the data contracts shared by every Vigil crate:
//! - **Samples:** Timestamped boolean attention observations
//! - **Phases:** The five valid attention-tracker states and their flag view
//! - **Records:** The append-only audit log written for every session
//!
//! All timestamps are monotonic nanoseconds since the session epoch.

pub mod record;
pub mod sample;

pub use record::*;
pub use sample::*;
