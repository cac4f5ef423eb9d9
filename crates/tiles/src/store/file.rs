use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use film_protocol::ConfigurationError;
use model::{TileCoord, TileGrid};

use super::{StoreError, StoreHeader, TileFrame, TiledImageStore};

pub const CONTAINER_EXTENSION: &str = "tiled";

const MAGIC: &[u8; 8] = b"TILEDRS1";
const PREAMBLE_LEN: u64 = MAGIC.len() as u64 + 4;

/// Forces the container extension onto `path`, keeping it when already present in any case.
pub fn normalize_destination(path: &Path) -> PathBuf {
    let has_extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case(CONTAINER_EXTENSION));
    if has_extension {
        path.to_path_buf()
    } else {
        path.with_extension(CONTAINER_EXTENSION)
    }
}

pub fn destination_exists(base: &Path) -> bool {
    normalize_destination(base).exists()
}

/// Tiled raster file: magic, little-endian header length, JSON header, then every tile of
/// the grid in raster order, each exactly `StoreHeader::tile_bytes` long.
#[derive(Debug)]
pub struct FileTileStore {
    path: PathBuf,
    file: File,
    layout: Option<FileLayout>,
}

#[derive(Debug, Clone, Copy)]
struct FileLayout {
    grid: TileGrid,
    data_start: u64,
    tile_bytes: u64,
}

impl FileTileStore {
    pub fn create(path: &Path) -> Result<Self, ConfigurationError> {
        let path = normalize_destination(path);
        let file = File::create(&path).map_err(|source| ConfigurationError::CreateOutput {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "creating tiled raster");
        Ok(Self {
            path,
            file,
            layout: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TiledImageStore for FileTileStore {
    fn begin(&mut self, header: &StoreHeader) -> Result<(), StoreError> {
        let grid = header.grid().map_err(|error| StoreError::Format {
            reason: error.to_string(),
        })?;
        let encoded = serde_json::to_vec(header).map_err(|error| StoreError::Header {
            source: io::Error::other(error),
        })?;
        let header_len = u32::try_from(encoded.len()).map_err(|_| StoreError::Header {
            source: io::Error::other("header exceeds 4 GiB"),
        })?;
        let tile_bytes = header.tile_bytes() as u64;
        let data_start = PREAMBLE_LEN + u64::from(header_len);
        let total_len = data_start + tile_bytes * grid.tile_count() as u64;

        let write = |file: &mut File| -> io::Result<()> {
            file.write_all(MAGIC)?;
            file.write_all(&header_len.to_le_bytes())?;
            file.write_all(&encoded)?;
            file.set_len(total_len)
        };
        write(&mut self.file).map_err(|source| StoreError::Header { source })?;
        self.layout = Some(FileLayout {
            grid,
            data_start,
            tile_bytes,
        });
        Ok(())
    }

    fn write_tile(&mut self, frame: &TileFrame<'_>) -> Result<(), StoreError> {
        let coord = frame.coord;
        let rejected = |reason: &str| StoreError::Rejected {
            tile_x: coord.x,
            tile_y: coord.y,
            reason: reason.to_owned(),
        };
        let layout = self.layout.ok_or_else(|| rejected("store header not written"))?;
        if frame.bytes.len() as u64 != layout.tile_bytes {
            return Err(rejected("staged tile has the wrong byte length"));
        }
        let index = layout
            .grid
            .tile_index(coord)
            .map_err(|_| rejected("tile outside the image"))?;
        let position = layout.data_start + index as u64 * layout.tile_bytes;
        self.file
            .seek(SeekFrom::Start(position))
            .and_then(|_| self.file.write_all(frame.bytes))
            .map_err(|source| StoreError::WriteTile {
                tile_x: coord.x,
                tile_y: coord.y,
                source,
            })
    }

    fn finish(&mut self) -> Result<(), StoreError> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_all())
            .map_err(|source| StoreError::Finish { source })
    }
}

/// Reads back a tiled raster written by [`FileTileStore`].
#[derive(Debug)]
pub struct TiledRasterReader {
    file: File,
    header: StoreHeader,
    grid: TileGrid,
    data_start: u64,
}

impl TiledRasterReader {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut file = File::open(path).map_err(|source| StoreError::Read { source })?;
        let mut preamble = [0u8; PREAMBLE_LEN as usize];
        file.read_exact(&mut preamble)
            .map_err(|source| StoreError::Read { source })?;
        if &preamble[..MAGIC.len()] != MAGIC {
            return Err(StoreError::Format {
                reason: "missing tiled raster magic".to_owned(),
            });
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&preamble[MAGIC.len()..]);
        let header_len = u32::from_le_bytes(len_bytes);
        let mut encoded = vec![0u8; header_len as usize];
        file.read_exact(&mut encoded)
            .map_err(|source| StoreError::Read { source })?;
        let header: StoreHeader =
            serde_json::from_slice(&encoded).map_err(|error| StoreError::Format {
                reason: error.to_string(),
            })?;
        let grid = header.grid().map_err(|error| StoreError::Format {
            reason: error.to_string(),
        })?;
        Ok(Self {
            file,
            header,
            grid,
            data_start: PREAMBLE_LEN + u64::from(header_len),
        })
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Decodes one full tile to `tile_size * tile_size * channels` samples in row-major order.
    pub fn read_tile(&mut self, coord: TileCoord) -> Result<Vec<f32>, StoreError> {
        let index = self.grid.tile_index(coord).map_err(|error| StoreError::Format {
            reason: error.to_string(),
        })?;
        let tile_bytes = self.header.tile_bytes();
        let mut bytes = vec![0u8; tile_bytes];
        self.file
            .seek(SeekFrom::Start(self.data_start + (index * tile_bytes) as u64))
            .and_then(|_| self.file.read_exact(&mut bytes))
            .map_err(|source| StoreError::Read { source })?;
        let encoding = self.header.component_encoding;
        Ok(bytes
            .chunks_exact(encoding.byte_width())
            .map(|component| encoding.decode(component))
            .collect())
    }
}
