pub mod bp_alert;
pub mod health;

pub use crate::AppState;
