//! Data directory resolution.

use std::path::PathBuf;

/// Platform data directory for the core (`~/.local/share/lector` on Linux,
/// `%APPDATA%\lector` on Windows, `~/Library/Application Support/lector`
/// on macOS). Falls back to `./lector-data` when the platform dir cannot
/// be resolved.
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("lector"))
        .unwrap_or_else(|| PathBuf::from("lector-data"))
}

/// Where the persistent key-value store lives.
pub fn get_store_dir() -> PathBuf {
    get_data_dir().join("store")
}
