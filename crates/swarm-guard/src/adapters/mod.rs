//! # Adapters
//!
//! Concrete implementations of the driven ports:
//!
//! - [`Backend`] - runtime-selected torrent client (qBittorrent or Transmission)
//! - [`SystemTimeSource`] - system clock
//! - [`TomlConfigSource`] - hot-reloaded TOML config file

pub mod backend;
pub mod connection;
pub mod qbittorrent;
pub mod time;
pub mod toml_config;
pub mod transmission;

pub use backend::{Backend, ClientAdapter};
pub use connection::ClientConnection;
pub use qbittorrent::QbittorrentAdapter;
pub use time::SystemTimeSource;
pub use toml_config::TomlConfigSource;
pub use transmission::TransmissionAdapter;
