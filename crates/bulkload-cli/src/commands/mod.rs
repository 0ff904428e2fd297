pub mod import;
pub mod init_db;
mod model_file;

pub use import::ImportCommand;
pub use init_db::InitDbCommand;
