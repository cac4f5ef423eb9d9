use model::{PixelPoint, PixelRect, PixelSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("block sample buffer holds {found} values, layout requires {expected}")]
pub struct BlockDataError {
    pub expected: usize,
    pub found: usize,
}

/// A rectangular block of accumulated samples produced by one rendering worker.
///
/// The core region is `offset..offset + size`; `border` extra pixels on every side hold the
/// part of the reconstruction-filter footprint that spills into neighboring blocks. Samples
/// are stored row-major over the padded region, `channel_count` values per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    offset: PixelPoint,
    size: PixelSize,
    border: u32,
    channel_count: usize,
    data: Vec<f32>,
}

impl ImageBlock {
    pub fn new(offset: PixelPoint, size: PixelSize, border: u32, channel_count: usize) -> Self {
        let len = padded_len(size, border, channel_count);
        Self {
            offset,
            size,
            border,
            channel_count,
            data: vec![0.0; len],
        }
    }

    pub fn from_data(
        offset: PixelPoint,
        size: PixelSize,
        border: u32,
        channel_count: usize,
        data: Vec<f32>,
    ) -> Result<Self, BlockDataError> {
        let expected = padded_len(size, border, channel_count);
        if data.len() != expected {
            return Err(BlockDataError {
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            offset,
            size,
            border,
            channel_count,
            data,
        })
    }

    pub fn offset(&self) -> PixelPoint {
        self.offset
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn border(&self) -> u32 {
        self.border
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Allocated sample capacity, which survives [`ImageBlock::copy_to`].
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn padded_size(&self) -> PixelSize {
        PixelSize::new(self.size.x + 2 * self.border, self.size.y + 2 * self.border)
    }

    pub fn padded_origin(&self) -> PixelPoint {
        PixelPoint::new(
            self.offset.x - self.border as i32,
            self.offset.y - self.border as i32,
        )
    }

    pub fn padded_rect(&self) -> PixelRect {
        PixelRect::from_origin_size(self.padded_origin(), self.padded_size())
    }

    /// Number of `f32` values needed to hold this block including its border.
    pub fn sample_len(&self) -> usize {
        padded_len(self.size, self.border, self.channel_count)
    }

    /// Index of the first channel of the pixel at absolute position `(x, y)`.
    pub fn sample_index(&self, x: i64, y: i64) -> Option<usize> {
        let origin = self.padded_origin();
        let padded = self.padded_size();
        let local_x = x - i64::from(origin.x);
        let local_y = y - i64::from(origin.y);
        if local_x < 0
            || local_y < 0
            || local_x >= i64::from(padded.x)
            || local_y >= i64::from(padded.y)
        {
            return None;
        }
        let pixel = local_y as usize * padded.x as usize + local_x as usize;
        Some(pixel * self.channel_count)
    }

    pub fn pixel(&self, x: i64, y: i64) -> Option<&[f32]> {
        let start = self.sample_index(x, y)?;
        self.data.get(start..start + self.channel_count)
    }

    pub fn pixel_mut(&mut self, x: i64, y: i64) -> Option<&mut [f32]> {
        let start = self.sample_index(x, y)?;
        let channel_count = self.channel_count;
        self.data.get_mut(start..start + channel_count)
    }

    /// Adds `values` to the pixel at absolute position `(x, y)`. Positions outside the padded
    /// region and slices that do not hold exactly one value per channel are ignored and
    /// reported with `false`.
    pub fn put(&mut self, x: i64, y: i64, values: &[f32]) -> bool {
        if values.len() != self.channel_count {
            return false;
        }
        let Some(pixel) = self.pixel_mut(x, y) else {
            return false;
        };
        for (target, value) in pixel.iter_mut().zip(values) {
            *target += *value;
        }
        true
    }

    /// Overwrites `target` with this block's metadata and samples, reusing its allocation.
    pub fn copy_to(&self, target: &mut ImageBlock) {
        target.offset = self.offset;
        target.size = self.size;
        target.border = self.border;
        target.channel_count = self.channel_count;
        target.data.clear();
        target.data.extend_from_slice(&self.data);
    }
}

fn padded_len(size: PixelSize, border: u32, channel_count: usize) -> usize {
    let padded = PixelSize::new(size.x + 2 * border, size.y + 2 * border);
    padded.area() * channel_count
}
