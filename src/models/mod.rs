pub mod auth;
pub mod directory;
pub mod photo;
pub mod report;
pub mod stop;
pub mod user;
