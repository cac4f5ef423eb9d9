//! Types exchanged between rendering workers and the tiled film.

mod block;
mod channels;
mod config;
mod format;

use std::path::PathBuf;

pub use block::{BlockDataError, ImageBlock};
pub use channels::ChannelSet;
pub use config::{FilmConfig, FilmSettings};
pub use format::{Chromaticities, ComponentEncoding, PixelLayout};

pub use model::{PixelPoint, PixelRect, PixelSize, TileCoord, TileGrid};

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error(
        "pixel format must be one of \"luminance\", \"luminance_alpha\", \"rgb\", \"rgba\", \
         \"xyz\", \"xyza\" or \"multichannel\", found \"{found}\""
    )]
    UnknownPixelLayout { found: String },
    #[error(
        "component format must be one of \"float16\", \"float32\" or \"uint32\", found \"{found}\""
    )]
    UnknownComponentEncoding { found: String },
    #[error("duplicate channel name \"{name}\"")]
    DuplicateChannel { name: String },
    #[error("channel list must not be empty")]
    EmptyChannelList,
    #[error("pixel format {layout} carries {expected} channels, {found} were declared")]
    LayoutChannelCount {
        layout: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid film geometry: {0}")]
    Geometry(#[from] model::GridError),
    #[error("film channels were already prepared")]
    AlreadyPrepared,
    #[error("film configuration does not name an output file")]
    MissingOutputPath,
    #[error("cannot create output file {}: {source}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
