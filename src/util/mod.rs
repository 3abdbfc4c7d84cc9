pub mod logger;
pub mod retention;
