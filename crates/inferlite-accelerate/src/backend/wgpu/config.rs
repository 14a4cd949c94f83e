use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_IMAGE_TILE: u32 = 8;
pub const MAX_IMAGE_TILE: u32 = 16;

/// Power preference used when requesting the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccelPowerPreference {
    #[default]
    Auto,
    HighPerformance,
    LowPower,
}

impl AccelPowerPreference {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "high" | "high-performance" | "high_performance" => Some(Self::HighPerformance),
            "low" | "low-power" | "low_power" => Some(Self::LowPower),
            _ => None,
        }
    }

    pub fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            Self::Auto | Self::HighPerformance => wgpu::PowerPreference::HighPerformance,
            Self::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Options for [`super::context::ImageContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ImageContextOptions {
    pub power_preference: AccelPowerPreference,
    pub force_fallback_adapter: bool,
    /// Requested square workgroup edge for image programs. Clamped to device
    /// limits and shrunk for small outputs.
    pub image_tile: Option<u32>,
    /// Write compiled program metadata and WGSL to the pipeline cache dir.
    pub persist_pipelines: bool,
    pub pipeline_cache_dir: Option<PathBuf>,
}

impl Default for ImageContextOptions {
    fn default() -> Self {
        Self {
            power_preference: AccelPowerPreference::Auto,
            force_fallback_adapter: false,
            image_tile: None,
            persist_pipelines: false,
            pipeline_cache_dir: None,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ImageContextOptions {
    /// Defaults overlaid with `INFERLITE_*` environment overrides.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Ok(raw) = std::env::var("INFERLITE_WGPU_POWER") {
            match AccelPowerPreference::parse(&raw) {
                Some(pref) => opts.power_preference = pref,
                None => log::warn!(
                    "INFERLITE_WGPU_POWER='{raw}' not recognized \
                     (expected auto|high|low); using auto"
                ),
            }
        }
        opts.image_tile = env_requested_image_tile();
        if let Some(flag) = std::env::var("INFERLITE_PERSIST_PIPELINES")
            .ok()
            .and_then(|v| parse_bool(&v))
        {
            opts.persist_pipelines = flag;
        }
        if let Ok(dir) = std::env::var("INFERLITE_PIPELINE_CACHE_DIR") {
            if !dir.trim().is_empty() {
                opts.pipeline_cache_dir = Some(PathBuf::from(dir));
            }
        }
        opts
    }
}

pub fn env_requested_image_tile() -> Option<u32> {
    std::env::var("INFERLITE_IMAGE_TILE")
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
}

fn floor_power_of_two(value: u32) -> u32 {
    if value == 0 {
        return 1;
    }
    1 << (31 - value.leading_zeros())
}

/// Square workgroup edge for an image program writing a `width x height`
/// output. Starts from the requested tile, respects the device invocation
/// limit, then halves while a smaller tile still covers the output.
pub fn select_image_tile(width: u32, height: u32, requested: u32, max_invocations: u32) -> u32 {
    let mut tile = floor_power_of_two(requested.clamp(1, MAX_IMAGE_TILE));
    while tile > 1 && (tile as u64 * tile as u64) > max_invocations.max(1) as u64 {
        tile /= 2;
    }
    let extent = width.max(height);
    while tile > 1 && tile / 2 >= extent {
        tile /= 2;
    }
    tile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_shrinks_for_small_outputs() {
        assert_eq!(select_image_tile(4, 2, 8, 256), 4);
        assert_eq!(select_image_tile(1, 1, 8, 256), 1);
        assert_eq!(select_image_tile(300, 300, 8, 256), 8);
    }

    #[test]
    fn tile_respects_invocation_limit_and_cap() {
        assert_eq!(select_image_tile(512, 512, 16, 64), 8);
        assert_eq!(select_image_tile(512, 512, 64, 1024), MAX_IMAGE_TILE);
        assert_eq!(select_image_tile(512, 512, 12, 1024), 8);
    }

    #[test]
    fn options_deserialize_from_kebab_case() {
        let opts: ImageContextOptions = serde_json::from_str(
            r#"{"power-preference":"low-power","image-tile":4,"persist-pipelines":true}"#,
        )
        .expect("options");
        assert_eq!(opts.power_preference, AccelPowerPreference::LowPower);
        assert_eq!(opts.image_tile, Some(4));
        assert!(opts.persist_pipelines);
        assert!(!opts.force_fallback_adapter);
    }

    #[test]
    fn power_preference_parse() {
        assert_eq!(
            AccelPowerPreference::parse(" High "),
            Some(AccelPowerPreference::HighPerformance)
        );
        assert_eq!(AccelPowerPreference::parse("turbo"), None);
    }
}
