use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    Host,
    Wgpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrecisionType {
    Float,
    Fp16,
}

impl PrecisionType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrecisionType::Float => "float",
            PrecisionType::Fp16 => "fp16",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataLayoutType {
    /// Dense row-major host buffer.
    Nchw,
    /// 2-D texture array, four channels packed per texel.
    ImageTexture2DArray,
}

/// Where a kernel runs and which data representation it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub target: TargetType,
    pub precision: PrecisionType,
    pub layout: DataLayoutType,
}

impl Place {
    pub const fn new(target: TargetType, precision: PrecisionType, layout: DataLayoutType) -> Self {
        Self {
            target,
            precision,
            layout,
        }
    }

    pub const fn wgpu_image(precision: PrecisionType) -> Self {
        Self::new(
            TargetType::Wgpu,
            precision,
            DataLayoutType::ImageTexture2DArray,
        )
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            TargetType::Host => "host",
            TargetType::Wgpu => "wgpu",
        };
        let layout = match self.layout {
            DataLayoutType::Nchw => "nchw",
            DataLayoutType::ImageTexture2DArray => "image2d-array",
        };
        write!(f, "{target}/{}/{layout}", self.precision.as_str())
    }
}
