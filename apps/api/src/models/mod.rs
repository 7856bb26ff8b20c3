pub mod activity;
pub mod application;
pub mod candidate;
pub mod job;
pub mod work_item;
