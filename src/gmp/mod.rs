//! GMP Adapter: typed operations over GMP with connect-retry and session
//! scoping, plus the XML wire helpers and report summary parser it is
//! built on.

mod client;
mod report;
mod wire;

pub use client::{GmpClient, GmpSession};
pub use report::parse_summary;
