pub mod ddl;
pub mod sessions;
pub mod tasks;
