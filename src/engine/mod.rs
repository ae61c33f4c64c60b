// OTAFlow Engine - Core module structure
pub mod cli;
pub mod config;
pub mod device;
pub mod locks;
pub mod updater;

pub use config::Config;
pub use updater::UpdateSession;
