//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

/// Initialize folio configuration and database
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<()> {
    let base_dir = base_dir.unwrap_or_else(Config::default_base_dir);
    let config_path = base_dir.join("config.toml");

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let config = Config::with_base_dir(&base_dir);
    config.validate()?;
    config.ensure_dirs()?;
    config.save(&config_path)?;
    info!("Created config at {:?}", config_path);

    let db = MetaDb::connect(&config.paths.db_file).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(())
}
