use std::path::PathBuf;

use model::TileGrid;
use serde::Deserialize;

use crate::{ComponentEncoding, ConfigurationError, PixelLayout};

/// User-facing film configuration as it appears in a config file.
///
/// Format strings stay strings here so that unknown values surface as
/// [`ConfigurationError`] at resolve time instead of as a deserializer error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilmConfig {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub pixel_format: String,
    pub component_format: String,
    pub filename: Option<PathBuf>,
    pub monochrome: bool,
}

impl Default for FilmConfig {
    fn default() -> Self {
        Self {
            width: 768,
            height: 576,
            tile_size: 32,
            pixel_format: "rgba".to_owned(),
            component_format: "float16".to_owned(),
            filename: None,
            monochrome: false,
        }
    }
}

impl FilmConfig {
    pub fn resolve(&self) -> Result<FilmSettings, ConfigurationError> {
        FilmSettings::parse(
            self.width,
            self.height,
            self.tile_size,
            &self.pixel_format,
            &self.component_format,
            self.monochrome,
        )
    }
}

/// Validated film geometry and pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilmSettings {
    pub grid: TileGrid,
    pub pixel_layout: PixelLayout,
    pub component_encoding: ComponentEncoding,
}

impl FilmSettings {
    pub fn new(
        width: u32,
        height: u32,
        tile_size: u32,
        pixel_layout: PixelLayout,
        component_encoding: ComponentEncoding,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            grid: TileGrid::new(width, height, tile_size)?,
            pixel_layout,
            component_encoding,
        })
    }

    /// Parses both format strings eagerly. With `monochrome` set, the layout is forced to
    /// luminance whatever was requested.
    pub fn parse(
        width: u32,
        height: u32,
        tile_size: u32,
        pixel_layout: &str,
        component_encoding: &str,
        monochrome: bool,
    ) -> Result<Self, ConfigurationError> {
        let requested = pixel_layout.parse::<PixelLayout>()?;
        let component_encoding = component_encoding.parse::<ComponentEncoding>()?;
        let pixel_layout = if monochrome && requested != PixelLayout::Luminance {
            tracing::warn!(
                requested = requested.name(),
                "monochrome mode enabled, forcing film pixel format to luminance"
            );
            PixelLayout::Luminance
        } else {
            requested
        };
        Self::new(width, height, tile_size, pixel_layout, component_encoding)
    }
}
