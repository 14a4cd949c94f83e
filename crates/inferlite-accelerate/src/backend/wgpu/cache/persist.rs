use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backend::wgpu::pipelines::ProgramKind;

/// Bump when bind group layouts or shader binding schemas change.
pub const PIPELINE_CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMeta {
    pub program: String,
    pub kind: ProgramKind,
    pub layout_tag: String,
    pub tile: u32,
    /// Absent in foreign files; treated as incompatible.
    pub version: Option<u32>,
}

impl PipelineMeta {
    pub fn is_current(&self) -> bool {
        self.version == Some(PIPELINE_CACHE_VERSION)
    }
}

pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("inferlite").join("pipelines"))
}

/// Write `<hash>.json` and `<hash>.wgsl` into `cache_dir`. Failures are
/// logged and otherwise ignored; the in-memory cache is authoritative.
pub fn persist_pipeline_meta(
    cache_dir: &Path,
    hash_key: u64,
    program: &str,
    kind: ProgramKind,
    layout_tag: &str,
    tile: u32,
    wgsl_src: &[u8],
) {
    if let Err(err) = std::fs::create_dir_all(cache_dir) {
        log::debug!("pipeline cache dir {} unavailable: {err}", cache_dir.display());
        return;
    }
    let wgsl_path = cache_dir.join(format!("{hash_key:016x}.wgsl"));
    if let Err(err) = std::fs::write(&wgsl_path, wgsl_src) {
        log::debug!("failed to persist {}: {err}", wgsl_path.display());
        return;
    }
    let meta = PipelineMeta {
        program: program.to_string(),
        kind,
        layout_tag: layout_tag.to_string(),
        tile,
        version: Some(PIPELINE_CACHE_VERSION),
    };
    let meta_path = cache_dir.join(format!("{hash_key:016x}.json"));
    match serde_json::to_vec_pretty(&meta) {
        Ok(json) => {
            if let Err(err) = std::fs::write(&meta_path, json) {
                log::debug!("failed to persist {}: {err}", meta_path.display());
            }
        }
        Err(err) => log::debug!("failed to encode pipeline meta for {program}: {err}"),
    }
}

/// Every readable, current-version `(meta, wgsl)` pair in `cache_dir`.
pub fn load_persisted(cache_dir: &Path) -> Vec<(PipelineMeta, String)> {
    let Ok(rd) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in rd.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(meta_bytes) = std::fs::read(&path) else {
            continue;
        };
        let meta: PipelineMeta = match serde_json::from_slice(&meta_bytes) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !meta.is_current() {
            continue;
        }
        let Ok(wgsl) = std::fs::read_to_string(cache_dir.join(format!("{stem}.wgsl"))) else {
            continue;
        };
        out.push((meta, wgsl));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_meta_is_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        persist_pipeline_meta(
            dir.path(),
            0xabc,
            "mul_half",
            ProgramKind::Mul,
            "mul:rgba16float",
            8,
            b"// wgsl",
        );
        assert!(dir.path().join("0000000000000abc.json").exists());
        assert!(dir.path().join("0000000000000abc.wgsl").exists());
        let loaded = load_persisted(dir.path());
        assert_eq!(loaded.len(), 1);
        let (meta, wgsl) = &loaded[0];
        assert_eq!(meta.program, "mul_half");
        assert_eq!(meta.kind, ProgramKind::Mul);
        assert_eq!(meta.tile, 8);
        assert_eq!(wgsl, "// wgsl");
    }

    #[test]
    fn stale_versions_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let meta = PipelineMeta {
            program: "mul".into(),
            kind: ProgramKind::Mul,
            layout_tag: "mul:rgba32float".into(),
            tile: 8,
            version: None,
        };
        std::fs::write(
            dir.path().join("01.json"),
            serde_json::to_vec(&meta).expect("json"),
        )
        .expect("write");
        std::fs::write(dir.path().join("01.wgsl"), "x").expect("write");
        assert!(load_persisted(dir.path()).is_empty());
    }
}
