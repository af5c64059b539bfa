#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_common::logging::init();

    let config_path = find_config_file()?;
    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!("failed to read config from {}: {e}", config_path.display())
    })?;
    let config = courier::CourierConfig::from_toml(&content)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", config_path.display()))?;

    courier::Courier::new(config).run().await
}

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.toml (current working directory)
/// 3. /etc/courier/courier.toml (system-wide config)
fn find_config_file() -> anyhow::Result<std::path::PathBuf> {
    if let Ok(env_path) = std::env::var("COURIER_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("COURIER_CONFIG points to non-existent file: {}", path.display());
    }

    let default_paths = [
        std::path::PathBuf::from("./courier.toml"),
        std::path::PathBuf::from("/etc/courier/courier.toml"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - COURIER_CONFIG environment variable\n{paths_tried}"
    )
}
