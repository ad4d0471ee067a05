pub mod models;
pub mod package_repo;
