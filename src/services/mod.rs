pub mod investigation;
pub mod progress;

pub use investigation::InvestigationService;
