use anyhow::Result;
use once_cell::sync::OnceCell;

use super::config::ImageContextOptions;
use super::context::ImageContext;

static INSTANCE: OnceCell<ImageContext> = OnceCell::new();

/// Create the process-wide context on first call; later calls return the
/// existing one and ignore `opts`.
pub fn register_image_context(opts: ImageContextOptions) -> Result<&'static ImageContext> {
    INSTANCE.get_or_try_init(move || ImageContext::new(opts))
}

/// The registered context, if any.
pub fn image_context() -> Option<&'static ImageContext> {
    INSTANCE.get()
}

/// Register with environment-derived options, logging instead of failing when
/// no adapter is available.
pub fn ensure_image_context() -> Option<&'static ImageContext> {
    match register_image_context(ImageContextOptions::from_env()) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            log::warn!("InferLite Accelerate: image context initialization failed: {e}");
            None
        }
    }
}
