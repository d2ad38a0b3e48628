//! `harbor env`

use super::container_paths;
use harbor_core::EnvironmentBuilder;
use std::path::PathBuf;

pub fn execute(base_path: Option<PathBuf>) -> anyhow::Result<()> {
    let env = EnvironmentBuilder::new(container_paths(base_path)).build()?;
    println!("{}", serde_json::to_string_pretty(&env.to_mapping())?);
    Ok(())
}
