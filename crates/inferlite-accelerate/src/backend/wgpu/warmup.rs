use std::path::Path;

use log::{debug, info};

use super::cache::persist::load_persisted;
use super::context::ImageContext;
use super::pipelines::ProgramKind;
use super::types::{Float, Half, ImagePrecision};

/// Compile every program for both precisions at the context's default tile.
/// Returns the number of programs now available.
pub fn warmup(ctx: &ImageContext) -> usize {
    let tile = ctx.image_tile();
    let mut ready = 0usize;
    for kind in ProgramKind::ALL {
        ready += usize::from(warm_one::<Float>(ctx, kind, tile));
        ready += usize::from(warm_one::<Half>(ctx, kind, tile));
    }
    info!("image kernel warmup: {ready} programs ready (tile {tile})");
    ready
}

fn warm_one<P: ImagePrecision>(ctx: &ImageContext, kind: ProgramKind, tile: u32) -> bool {
    match ctx.program::<P>(kind, tile) {
        Ok(_) => true,
        Err(err) => {
            log::warn!("warmup skipped {}: {err}", kind.base_name());
            false
        }
    }
}

/// Recompile programs persisted by an earlier run from `cache_dir` (or the
/// context's own cache dir). Unreadable or stale entries are skipped.
pub fn warmup_from_disk(ctx: &ImageContext, cache_dir: Option<&Path>) -> usize {
    let Some(dir) = cache_dir.or(ctx.pipeline_cache_dir()) else {
        return 0;
    };
    let mut compiled = 0usize;
    for (meta, wgsl) in load_persisted(dir) {
        let Some((kind, format)) = ProgramKind::parse_layout_tag(&meta.layout_tag) else {
            continue;
        };
        match ctx.compile_program(kind, format, &meta.program, meta.tile, &wgsl, false) {
            Ok(_) => compiled += 1,
            Err(err) => debug!("warmup: persisted program '{}' rejected: {err}", meta.program),
        }
    }
    if compiled > 0 {
        info!("warmup: precompiled {compiled} pipelines from {}", dir.display());
    }
    compiled
}
