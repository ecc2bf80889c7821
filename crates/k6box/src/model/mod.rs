pub mod ids;
pub mod issue;
pub mod options;
pub mod result;

pub use ids::RequestId;
pub use issue::*;
pub use options::*;
pub use result::*;

/// Hard ceiling on script text accepted by the gate (1 MiB).
pub const MAX_SCRIPT_BYTES: usize = 1024 * 1024;

/// Highest virtual-user count accepted for `vus` or any stage target.
pub const MAX_VUS: u32 = 50;

/// Longest accepted `duration`, in milliseconds (5 minutes).
pub const MAX_DURATION_MS: u64 = 5 * 60 * 1000;
