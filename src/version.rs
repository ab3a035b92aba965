//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name from Cargo.toml.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Version string used in logs and report metadata: `{name} {version}`.
pub fn version_string() -> String {
    format!("{PKG_NAME} {PKG_VERSION}")
}
