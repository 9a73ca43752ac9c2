mod config;
mod fill;
mod find;
mod index;
mod remove;
mod status;

pub use config::ConfigCommand;
pub use fill::FillArgs;
pub use find::FindArgs;
pub use index::IndexCommand;
pub use remove::RemoveArgs;

pub use config::handle_config;
pub use fill::handle_fill;
pub use find::handle_find;
pub use index::handle_index;
pub use remove::handle_remove;
pub use status::handle_status;
