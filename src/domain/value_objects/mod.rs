pub mod backoff;
pub mod charge_requests;
pub mod enums;
