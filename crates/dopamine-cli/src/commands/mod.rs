pub mod challenge;
pub mod config;
pub mod member;
pub mod session;
pub mod today;
