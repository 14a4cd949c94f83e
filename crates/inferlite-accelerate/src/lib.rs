//! InferLite Accelerate: wgpu texture-image kernels
//!
//! Tensors live on the device as 2-D texture arrays ([`DeviceImage`]). Kernels
//! follow the framework lifecycle from `inferlite-kernel-api`: a one-time
//! `prepare_for_run` that analyses shapes, selects and compiles a program and
//! packs its parameter buffer, then a cheap `run` that binds and submits.
//!
//! Each kernel is one generic body specialised by an [`ImagePrecision`]
//! (`Float` -> `rgba32float`, `Half` -> `rgba16float`).

pub mod backend;
pub mod kernels;
pub mod telemetry;

pub use backend::wgpu::config::{AccelPowerPreference, ImageContextOptions};
pub use backend::wgpu::context::ImageContext;
pub use backend::wgpu::image::{DeviceImage, ImageLayout};
pub use backend::wgpu::pipelines::{PipelineBundle, ProgramKind};
pub use backend::wgpu::provider::{ensure_image_context, image_context, register_image_context};
pub use backend::wgpu::types::{Float, Half, ImagePrecision};
pub use backend::wgpu::warmup::{warmup, warmup_from_disk};
pub use kernels::mul::{
    plan_mul, MulImageCompute, MulImageComputeHalf, MulImageKernel, MulParam, MulPlan, MulShape,
};
pub use kernels::registry::{
    builtin_registry, create_kernel, BoxedImageKernel, ImageKernelFactory, OpParam,
};
pub use kernels::reshape::{
    infer_reshape_dims, ReshapeImageCompute, ReshapeImageComputeHalf, ReshapeImageKernel,
    ReshapeParam, ReshapeProgram, ReshapeStage,
};
pub use telemetry::{KernelTelemetry, KernelTelemetrySnapshot};
