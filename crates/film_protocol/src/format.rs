use std::fmt;
use std::str::FromStr;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// CIE xy coordinates of the primaries and white point attached to the store header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chromaticities {
    pub red: [f32; 2],
    pub green: [f32; 2],
    pub blue: [f32; 2],
    pub white: [f32; 2],
}

impl Chromaticities {
    /// Rec. 709 primaries with a D65 white point.
    pub const REC709: Self = Self {
        red: [0.64, 0.33],
        green: [0.30, 0.60],
        blue: [0.15, 0.06],
        white: [0.3127, 0.3290],
    };

    /// Identity primaries for data stored directly as CIE XYZ.
    pub const XYZ: Self = Self {
        red: [1.0, 0.0],
        green: [0.0, 1.0],
        blue: [0.0, 0.0],
        white: [1.0 / 3.0, 1.0 / 3.0],
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelLayout {
    Luminance,
    LuminanceAlpha,
    Rgb,
    Rgba,
    Xyz,
    Xyza,
    /// Arbitrary ordered channel list supplied through `prepare`.
    MultiChannel,
}

impl PixelLayout {
    pub fn name(self) -> &'static str {
        match self {
            PixelLayout::Luminance => "luminance",
            PixelLayout::LuminanceAlpha => "luminance_alpha",
            PixelLayout::Rgb => "rgb",
            PixelLayout::Rgba => "rgba",
            PixelLayout::Xyz => "xyz",
            PixelLayout::Xyza => "xyza",
            PixelLayout::MultiChannel => "multichannel",
        }
    }

    /// Canonical channel names; empty for [`PixelLayout::MultiChannel`].
    pub fn channel_names(self) -> &'static [&'static str] {
        match self {
            PixelLayout::Luminance => &["Y"],
            PixelLayout::LuminanceAlpha => &["Y", "A"],
            PixelLayout::Rgb => &["R", "G", "B"],
            PixelLayout::Rgba => &["R", "G", "B", "A"],
            PixelLayout::Xyz => &["X", "Y", "Z"],
            PixelLayout::Xyza => &["X", "Y", "Z", "A"],
            PixelLayout::MultiChannel => &[],
        }
    }

    pub fn channel_count(self) -> Option<usize> {
        match self {
            PixelLayout::MultiChannel => None,
            layout => Some(layout.channel_names().len()),
        }
    }

    /// Only single recognized color layouts carry a chromaticity tag.
    pub fn chromaticities(self) -> Option<Chromaticities> {
        match self {
            PixelLayout::Rgb | PixelLayout::Rgba => Some(Chromaticities::REC709),
            PixelLayout::Xyz | PixelLayout::Xyza => Some(Chromaticities::XYZ),
            PixelLayout::Luminance | PixelLayout::LuminanceAlpha | PixelLayout::MultiChannel => {
                None
            }
        }
    }
}

impl FromStr for PixelLayout {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "luminance" => Ok(PixelLayout::Luminance),
            "luminance_alpha" => Ok(PixelLayout::LuminanceAlpha),
            "rgb" => Ok(PixelLayout::Rgb),
            "rgba" => Ok(PixelLayout::Rgba),
            "xyz" => Ok(PixelLayout::Xyz),
            "xyza" => Ok(PixelLayout::Xyza),
            "multichannel" => Ok(PixelLayout::MultiChannel),
            _ => Err(ConfigurationError::UnknownPixelLayout {
                found: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentEncoding {
    Float16,
    Float32,
    UInt32,
}

impl ComponentEncoding {
    pub fn name(self) -> &'static str {
        match self {
            ComponentEncoding::Float16 => "float16",
            ComponentEncoding::Float32 => "float32",
            ComponentEncoding::UInt32 => "uint32",
        }
    }

    pub const fn byte_width(self) -> usize {
        match self {
            ComponentEncoding::Float16 => 2,
            ComponentEncoding::Float32 | ComponentEncoding::UInt32 => 4,
        }
    }

    /// Writes `value` little-endian into `out`, which must be exactly `byte_width` long.
    ///
    /// `UInt32` uses a saturating conversion: negatives clamp to 0 and NaN maps to 0.
    pub fn encode(self, value: f32, out: &mut [u8]) {
        match self {
            ComponentEncoding::Float16 => {
                out.copy_from_slice(&f16::from_f32(value).to_le_bytes());
            }
            ComponentEncoding::Float32 => out.copy_from_slice(&value.to_le_bytes()),
            ComponentEncoding::UInt32 => out.copy_from_slice(&(value as u32).to_le_bytes()),
        }
    }

    /// Inverse of [`ComponentEncoding::encode`]; `bytes` must be exactly `byte_width` long.
    pub fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            ComponentEncoding::Float16 => f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
            ComponentEncoding::Float32 => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            ComponentEncoding::UInt32 => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
            }
        }
    }
}

impl FromStr for ComponentEncoding {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "float16" => Ok(ComponentEncoding::Float16),
            "float32" => Ok(ComponentEncoding::Float32),
            "uint32" => Ok(ComponentEncoding::UInt32),
            _ => Err(ConfigurationError::UnknownComponentEncoding {
                found: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ComponentEncoding {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}
