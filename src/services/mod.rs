pub mod auth;
pub mod directories;
pub mod photos;
pub mod reports;
pub mod stops;
pub mod users;

pub use auth::AuthService;
pub use directories::DirectoryService;
pub use photos::PhotoService;
pub use reports::ReportService;
pub use stops::StopService;
pub use users::UserService;
