pub mod binder;
pub mod layout;
pub mod models;
pub mod response;
pub mod routes;
