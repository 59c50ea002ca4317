use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::app::AppContext;
use crate::config::Config;
use crate::daemon::Daemon;

pub async fn run(config: Config, duration: Option<Duration>) -> anyhow::Result<()> {
    let ctx = AppContext::new(config).context("Failed to set up pipeline")?;
    Daemon::new(Arc::new(ctx), duration).run().await?;
    Ok(())
}

pub fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path()?,
    };

    Config::write_default_config(&path, force)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

pub fn show_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_display_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config(Some(&path), false).unwrap();
        assert!(path.exists());
        assert!(init_config(Some(&path), false).is_err());
        init_config(Some(&path), true).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.minimum_interval_ms, 500);
    }
}
