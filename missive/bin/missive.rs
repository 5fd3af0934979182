#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use anyhow::Context;

const CONFIG_VAR: &str = "MISSIVE_CONFIG";
const DEFAULT_CONFIGS: [&str; 2] = ["./missive.config.ron", "/etc/missive/missive.config.ron"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path()?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let missive: missive::controller::Missive =
        ron::from_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))?;

    missive.run().await
}

/// An explicit `MISSIVE_CONFIG` must exist; otherwise the first default present wins
fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_VAR) {
        let path = PathBuf::from(explicit);
        anyhow::ensure!(path.exists(), "{CONFIG_VAR} points to missing file {}", path.display());
        return Ok(path);
    }

    DEFAULT_CONFIGS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .with_context(|| format!("No config found; set {CONFIG_VAR} or create one of {DEFAULT_CONFIGS:?}"))
}
