// Library surface shared by the binary and the integration tests.
pub mod app_dirs;
pub mod browser;
pub mod config;
pub mod history;
pub mod settings;
pub mod snippets;
pub mod strip;
pub mod timestamp;
pub mod util;
pub mod web;
