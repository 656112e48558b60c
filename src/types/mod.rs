pub mod file_kind;
pub mod thumbnail;
