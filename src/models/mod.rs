pub mod api;
pub mod contact;
pub mod credits;
pub mod job;
