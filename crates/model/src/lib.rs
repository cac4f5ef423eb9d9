use std::fmt;

use bitvec::prelude::{BitVec, Lsb0};

/// Relative tile offsets of a 3x3 neighborhood in raster order, center included.
pub const NEIGHBORHOOD_OFFSETS: [(i32, i32); 9] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (0, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "({}, {})", self.x, self.y)
    }
}

/// Absolute pixel position. Signed because padded block regions extend past the image origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PixelSize {
    pub x: u32,
    pub y: u32,
}

impl PixelSize {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub const fn area(self) -> usize {
        self.x as usize * self.y as usize
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl PixelRect {
    pub fn from_origin_size(origin: PixelPoint, size: PixelSize) -> Self {
        Self {
            x0: i64::from(origin.x),
            y0: i64::from(origin.y),
            x1: i64::from(origin.x) + i64::from(size.x),
            y1: i64::from(origin.y) + i64::from(size.y),
        }
    }

    pub fn width(self) -> i64 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(self) -> i64 {
        (self.y1 - self.y0).max(0)
    }

    pub fn is_empty(self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn intersect(self, other: PixelRect) -> Option<PixelRect> {
        let rect = PixelRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (!rect.is_empty()).then_some(rect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("tile size must be at least 1")]
    ZeroTileSize,
    #[error("image size must be at least 1x1, got {size_x}x{size_y}")]
    ZeroImageSize { size_x: u32, size_y: u32 },
    #[error("tile count overflows the address space")]
    TileCountOverflow,
    #[error("tile coordinate ({tile_x}, {tile_y}) is outside the tile grid")]
    TileOutOfBounds { tile_x: u32, tile_y: u32 },
    #[error("tile index {index} is outside the tile grid")]
    TileIndexOutOfBounds { index: usize },
}

/// Partition of a `size_x x size_y` image into square tiles of `tile_size` pixels.
///
/// Edge tiles are clipped: the grid has `ceil(W / T) x ceil(H / T)` coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileGrid {
    size: PixelSize,
    tile_size: u32,
    tiles_per_row: u32,
    tiles_per_column: u32,
}

impl TileGrid {
    pub fn new(size_x: u32, size_y: u32, tile_size: u32) -> Result<Self, GridError> {
        if tile_size == 0 {
            return Err(GridError::ZeroTileSize);
        }
        if size_x == 0 || size_y == 0 {
            return Err(GridError::ZeroImageSize { size_x, size_y });
        }
        let tiles_per_row = size_x.div_ceil(tile_size);
        let tiles_per_column = size_y.div_ceil(tile_size);
        (tiles_per_row as usize)
            .checked_mul(tiles_per_column as usize)
            .ok_or(GridError::TileCountOverflow)?;
        Ok(Self {
            size: PixelSize::new(size_x, size_y),
            tile_size,
            tiles_per_row,
            tiles_per_column,
        })
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn tiles_per_row(&self) -> u32 {
        self.tiles_per_row
    }

    pub fn tiles_per_column(&self) -> u32 {
        self.tiles_per_column
    }

    pub const fn tile_count(&self) -> usize {
        self.tiles_per_row as usize * self.tiles_per_column as usize
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.x < self.tiles_per_row && coord.y < self.tiles_per_column
    }

    pub fn tile_index(&self, coord: TileCoord) -> Result<usize, GridError> {
        if !self.contains(coord) {
            return Err(GridError::TileOutOfBounds {
                tile_x: coord.x,
                tile_y: coord.y,
            });
        }
        Ok(coord.y as usize * self.tiles_per_row as usize + coord.x as usize)
    }

    pub fn tile_coord(&self, index: usize) -> Result<TileCoord, GridError> {
        if index >= self.tile_count() {
            return Err(GridError::TileIndexOutOfBounds { index });
        }
        let row = self.tiles_per_row as usize;
        Ok(TileCoord::new((index % row) as u32, (index / row) as u32))
    }

    /// Tile holding the aligned pixel origin, or `None` when the point is not tile-aligned
    /// or falls outside the grid.
    pub fn aligned_tile_of(&self, origin: PixelPoint) -> Option<TileCoord> {
        let tile_size = i64::from(self.tile_size);
        let (x, y) = (i64::from(origin.x), i64::from(origin.y));
        if x < 0 || y < 0 || x % tile_size != 0 || y % tile_size != 0 {
            return None;
        }
        let coord = TileCoord::new((x / tile_size) as u32, (y / tile_size) as u32);
        self.contains(coord).then_some(coord)
    }

    pub fn tile_origin(&self, coord: TileCoord) -> PixelPoint {
        PixelPoint::new(
            (coord.x * self.tile_size) as i32,
            (coord.y * self.tile_size) as i32,
        )
    }

    /// Pixel extent of the tile after clipping against the image edge.
    pub fn tile_extent(&self, coord: TileCoord) -> PixelSize {
        let x0 = coord.x * self.tile_size;
        let y0 = coord.y * self.tile_size;
        PixelSize::new(
            self.tile_size.min(self.size.x.saturating_sub(x0)),
            self.tile_size.min(self.size.y.saturating_sub(y0)),
        )
    }

    pub fn offset(&self, coord: TileCoord, dx: i32, dy: i32) -> Option<TileCoord> {
        let x = coord.x.checked_add_signed(dx)?;
        let y = coord.y.checked_add_signed(dy)?;
        let shifted = TileCoord::new(x, y);
        self.contains(shifted).then_some(shifted)
    }

    /// The 3x3 neighborhood of `coord` clipped to the grid, center included.
    pub fn neighborhood(&self, coord: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        NEIGHBORHOOD_OFFSETS
            .iter()
            .filter_map(move |&(dx, dy)| self.offset(coord, dx, dy))
    }

    /// The up to 8 in-grid neighbors of `coord`, center excluded.
    pub fn neighbors(&self, coord: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        self.neighborhood(coord)
            .filter(move |neighbor| *neighbor != coord)
    }

    pub fn iter_coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (0..self.tiles_per_column)
            .flat_map(move |y| (0..self.tiles_per_row).map(move |x| TileCoord::new(x, y)))
    }
}

/// One bit per tile coordinate of a [`TileGrid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBitset {
    grid: TileGrid,
    bits: BitVec<usize, Lsb0>,
    set_count: usize,
}

impl TileBitset {
    pub fn new(grid: TileGrid) -> Self {
        Self {
            grid,
            bits: BitVec::repeat(false, grid.tile_count()),
            set_count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.set_count
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        self.grid
            .tile_index(coord)
            .map(|index| self.bits[index])
            .unwrap_or(false)
    }

    /// Sets the bit for `coord`; returns `true` if it was previously clear.
    pub fn insert(&mut self, coord: TileCoord) -> Result<bool, GridError> {
        let index = self.grid.tile_index(coord)?;
        let was_set = self.bits[index];
        self.bits.set(index, true);
        self.set_count += !was_set as usize;
        Ok(!was_set)
    }

    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let row = self.grid.tiles_per_row() as usize;
        self.bits
            .iter_ones()
            .map(move |index| TileCoord::new((index % row) as u32, (index / row) as u32))
    }
}
