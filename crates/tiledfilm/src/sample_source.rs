//! Synthetic renderer: one sample per pixel center, splatted through a box filter.
//!
//! Samples near a tile edge land in the block border, so the final image is only correct
//! once neighboring blocks have been merged.

use engine::{BlockSource, TileJob};
use film_protocol::ImageBlock;
use model::PixelSize;

#[derive(Debug, Clone, Copy)]
pub struct BoxFilterSource {
    image: PixelSize,
    radius: u32,
    channel_count: usize,
}

impl BoxFilterSource {
    pub fn new(image: PixelSize, radius: u32, channel_count: usize) -> Self {
        Self {
            image,
            radius,
            channel_count,
        }
    }

    /// Unfiltered value of the sample taken at pixel `(x, y)`.
    pub fn radiance(&self, x: u32, y: u32, channel: usize) -> f32 {
        let channel = channel as u32;
        let pattern = (x * (channel + 1) + y * (channel + 3)) % 17;
        pattern as f32 / 16.0 + channel as f32
    }

    fn weight(&self) -> f32 {
        let width = 2 * self.radius + 1;
        1.0 / (width * width) as f32
    }

    /// Filtered value of pixel `(x, y)`, computed directly over the whole image.
    pub fn expected(&self, x: u32, y: u32, channel: usize) -> f32 {
        let x0 = x.saturating_sub(self.radius);
        let y0 = y.saturating_sub(self.radius);
        let x1 = (x + self.radius).min(self.image.x - 1);
        let y1 = (y + self.radius).min(self.image.y - 1);
        let mut sum = 0.0;
        for sample_y in y0..=y1 {
            for sample_x in x0..=x1 {
                sum += self.radiance(sample_x, sample_y, channel);
            }
        }
        sum * self.weight()
    }
}

impl BlockSource for BoxFilterSource {
    fn render(&self, job: &TileJob) -> ImageBlock {
        let mut block = ImageBlock::new(job.offset, job.size, self.radius, self.channel_count);
        let weight = self.weight();
        let radius = i64::from(self.radius);
        let mut splat = vec![0.0; self.channel_count];
        for local_y in 0..job.size.y {
            for local_x in 0..job.size.x {
                let x = job.offset.x as u32 + local_x;
                let y = job.offset.y as u32 + local_y;
                for (channel, value) in splat.iter_mut().enumerate() {
                    *value = self.radiance(x, y, channel) * weight;
                }
                for target_y in i64::from(y) - radius..=i64::from(y) + radius {
                    for target_x in i64::from(x) - radius..=i64::from(x) + radius {
                        block.put(target_x, target_y, &splat);
                    }
                }
            }
        }
        block
    }
}
