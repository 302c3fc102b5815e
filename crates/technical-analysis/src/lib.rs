pub mod features;
pub mod indicators;
pub mod report;

pub use features::compute_technical_features;
pub use report::compute_analysis_report;
