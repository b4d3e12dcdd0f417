pub mod gvm;
pub mod probe;
pub mod scan;
pub mod target;

pub use gvm::GvmStatus;
pub use probe::{GvmConfig, ProbeConfig};
pub use scan::{ScanRecord, ScanSummary, ScanType};
pub use target::{Criticality, TargetEntry};
