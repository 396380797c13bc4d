pub mod activity;
pub mod refund;
