pub mod organization;
pub mod overtime;
pub mod search;
pub mod user;
