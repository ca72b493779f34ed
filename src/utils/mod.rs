pub mod config;
pub mod disk;

pub use config::Config;
pub use disk::DiskStats;
