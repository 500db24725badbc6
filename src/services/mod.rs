pub mod bp_alert;
