pub mod channel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod fanout;
pub mod host;
pub mod poller;
pub mod runner;
pub mod utils;
pub mod verify;

pub use channel::HostChannel;
pub use cli::Cli;
pub use config::Config;
pub use fanout::Fleet;
pub use host::HostSpec;
pub use runner::CommandResult;
