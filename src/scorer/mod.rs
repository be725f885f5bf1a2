pub mod scan_executor;

pub use scan_executor::{compare_scores, run_scan};
