use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use film_protocol::FilmConfig;
use serde::Deserialize;

/// Everything a run reads from its TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub film: FilmConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Worker threads; one per core when unset.
    pub workers: Option<usize>,
    /// Box filter radius in pixels, also used as the block border.
    pub filter_radius: u32,
    /// Explicit channel list. Empty means the pixel format's canonical names.
    pub channels: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            workers: None,
            filter_radius: 1,
            channels: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let config: RunConfig = toml::from_str("").expect("empty config");
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.render.filter_radius, 1);
    }

    #[test]
    fn film_and_render_sections_parse() {
        let config: RunConfig = toml::from_str(
            r#"
            [film]
            width = 256
            pixel_format = "multichannel"
            filename = "out/aov"

            [render]
            workers = 3
            channels = ["albedo.r", "albedo.g", "depth"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.film.width, 256);
        assert_eq!(config.film.height, 576);
        assert_eq!(config.render.workers, Some(3));
        assert_eq!(config.render.channels.len(), 3);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<RunConfig>("[render]\nradius = 2\n").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = RunConfig::load(&dir.path().join("missing.toml")).expect_err("no file");
        assert!(error.to_string().contains("read config"));
    }
}
