pub mod flows;
pub mod password;

pub use flows::{AuthFlows, FlowError, FlowOutcome};
pub use password::is_strong_password;
