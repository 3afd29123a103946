pub mod assignment;
pub mod driver;
pub mod event;
pub mod incident;
pub mod route;
pub mod zone;
