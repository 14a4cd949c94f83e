use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use inferlite_kernel_api::{DDim, Kernel, KernelError, KernelResult, Place};
use tracing::info_span;

use crate::backend::wgpu::context::ImageContext;
use crate::backend::wgpu::dispatch::common::{encode_pass, image_grid};
use crate::backend::wgpu::image::{DeviceImage, ImageLayout};
use crate::backend::wgpu::params::ReshapeParams;
use crate::backend::wgpu::pipelines::{PipelineBundle, ProgramKind};
use crate::backend::wgpu::types::{Float, Half, ImagePrecision};

pub const RESHAPE_OP: &str = "reshape";

/// Resolve a reshape target. `0` copies the input extent at the same axis,
/// one `-1` is inferred from the remaining element count.
pub fn infer_reshape_dims(input: &DDim, shape: &[i64]) -> KernelResult<DDim> {
    let mut dims = Vec::with_capacity(shape.len());
    let mut infer_axis = None;
    for (axis, &s) in shape.iter().enumerate() {
        match s {
            -1 => {
                if infer_axis.replace(axis).is_some() {
                    return Err(KernelError::invalid_shape(
                        RESHAPE_OP,
                        format!("more than one -1 in target shape {shape:?}"),
                    ));
                }
                dims.push(1);
            }
            0 => {
                let d = input.get(axis).ok_or_else(|| {
                    KernelError::invalid_shape(
                        RESHAPE_OP,
                        format!("0 at axis {axis} has no input extent to copy ({input})"),
                    )
                })?;
                dims.push(d);
            }
            s if s > 0 => dims.push(s as usize),
            s => {
                return Err(KernelError::invalid_shape(
                    RESHAPE_OP,
                    format!("invalid extent {s} in target shape {shape:?}"),
                ))
            }
        }
    }
    let overflow = || {
        KernelError::invalid_shape(RESHAPE_OP, format!("element count of {shape:?} overflows"))
    };
    let total = input.production().ok_or_else(overflow)?;
    if let Some(axis) = infer_axis {
        let known = DDim::new(&dims).production().ok_or_else(overflow)?;
        if known == 0 || total % known != 0 {
            return Err(KernelError::invalid_shape(
                RESHAPE_OP,
                format!("cannot infer -1 reshaping {input} to {shape:?}"),
            ));
        }
        dims[axis] = total / known;
    }
    let target = DDim::from(dims);
    if target.production() != Some(total) {
        return Err(KernelError::invalid_shape(
            RESHAPE_OP,
            format!("element count mismatch reshaping {input} to {target}"),
        ));
    }
    Ok(target)
}

pub(crate) fn ensure_precision<P: ImagePrecision>(
    op: &'static str,
    role: &str,
    image: &DeviceImage,
) -> KernelResult<()> {
    if image.precision() != P::PRECISION {
        return Err(KernelError::invalid_param(
            op,
            format!(
                "{role} image '{}' is {} but the kernel runs in {}",
                image.label(),
                image.precision().as_str(),
                P::PRECISION.as_str()
            ),
        ));
    }
    Ok(())
}

/// Compiled reshape program plus its parameter buffer for one pair of
/// layouts.
pub struct ReshapeProgram<P: ImagePrecision> {
    bundle: Arc<PipelineBundle>,
    params: wgpu::Buffer,
    grid: (u32, u32, u32),
    _precision: PhantomData<P>,
}

impl<P: ImagePrecision> ReshapeProgram<P> {
    pub fn prepare(
        ctx: &ImageContext,
        op: &'static str,
        src: &ImageLayout,
        dst: &ImageLayout,
    ) -> KernelResult<Self> {
        if src.element_count() != dst.element_count() {
            return Err(KernelError::invalid_shape(
                op,
                format!(
                    "reshape from {:?} to {:?} changes the element count",
                    src.nchw, dst.nchw
                ),
            ));
        }
        let tile = ctx.tile_for(dst);
        let bundle = ctx.program::<P>(ProgramKind::Reshape, tile)?;
        let params = ctx.create_param_buffer(
            op,
            "inferlite-reshape-params",
            &ReshapeParams::new(src, dst),
        )?;
        Ok(Self {
            bundle,
            params,
            grid: image_grid(dst, tile),
            _precision: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.bundle.name
    }

    pub fn bind(
        &self,
        ctx: &ImageContext,
        input: &DeviceImage,
        output: &DeviceImage,
    ) -> wgpu::BindGroup {
        ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("inferlite-reshape-bind"),
            layout: &self.bundle.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(output.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params.as_entire_binding(),
                },
            ],
        })
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        encode_pass(encoder, self.name(), &self.bundle.pipeline, bind_group, self.grid);
    }

    /// Count a submitted pass.
    pub fn record_submitted(&self, ctx: &ImageContext) {
        ctx.telemetry().record_reshape();
        ctx.telemetry().record_dispatch(self.name());
    }
}

/// Reshape pass with its own output image, embedded in another kernel.
pub struct ReshapeStage<P: ImagePrecision> {
    program: ReshapeProgram<P>,
    output: DeviceImage,
    bind_group: wgpu::BindGroup,
}

impl<P: ImagePrecision> ReshapeStage<P> {
    pub fn prepare(
        ctx: &ImageContext,
        op: &'static str,
        input: &DeviceImage,
        target: DDim,
    ) -> KernelResult<Self> {
        let output = ctx.allocate_image::<P>(op, "inferlite-reshape-stage", target)?;
        let program = ReshapeProgram::<P>::prepare(ctx, op, input.layout(), output.layout())?;
        let bind_group = program.bind(ctx, input, &output);
        Ok(Self {
            program,
            output,
            bind_group,
        })
    }

    pub fn output(&self) -> &DeviceImage {
        &self.output
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        self.program.encode(encoder, &self.bind_group);
    }

    pub fn record_submitted(&self, ctx: &ImageContext) {
        self.program.record_submitted(ctx);
    }
}

pub struct ReshapeParam<'a> {
    pub x: &'a DeviceImage,
    pub output: &'a DeviceImage,
    pub shape: Vec<i64>,
}

struct PreparedReshape<P: ImagePrecision> {
    program: ReshapeProgram<P>,
    bind_group: wgpu::BindGroup,
}

/// Standalone reshape kernel over device images.
pub struct ReshapeImageKernel<'a, P: ImagePrecision> {
    param: ReshapeParam<'a>,
    prepared: Option<PreparedReshape<P>>,
}

pub type ReshapeImageCompute<'a> = ReshapeImageKernel<'a, Float>;
pub type ReshapeImageComputeHalf<'a> = ReshapeImageKernel<'a, Half>;

impl<'a, P: ImagePrecision> ReshapeImageKernel<'a, P> {
    pub fn new(param: ReshapeParam<'a>) -> Self {
        Self {
            param,
            prepared: None,
        }
    }

    pub fn param(&self) -> &ReshapeParam<'a> {
        &self.param
    }

    /// Replace the operands; prepared state is dropped and rebuilt on the
    /// next launch.
    pub fn set_param(&mut self, param: ReshapeParam<'a>) {
        self.param = param;
        self.prepared = None;
    }

    pub fn program_name(&self) -> Option<&str> {
        self.prepared.as_ref().map(|p| p.program.name())
    }
}

impl<'a, P: ImagePrecision> Kernel for ReshapeImageKernel<'a, P> {
    type Context = ImageContext;

    fn op_type(&self) -> &'static str {
        RESHAPE_OP
    }

    fn place(&self) -> Place {
        Place::wgpu_image(P::PRECISION)
    }

    fn prepare_for_run(&mut self, ctx: &ImageContext) -> KernelResult<()> {
        let _span = info_span!(
            "kernel.prepare",
            op = RESHAPE_OP,
            precision = P::PRECISION.as_str()
        )
        .entered();
        let started = Instant::now();
        self.prepared = None;
        let ReshapeParam { x, output, shape } = &self.param;
        ensure_precision::<P>(RESHAPE_OP, "input", x)?;
        ensure_precision::<P>(RESHAPE_OP, "output", output)?;
        if x.same_texture(output) {
            return Err(KernelError::invalid_param(
                RESHAPE_OP,
                "output image aliases the input",
            ));
        }
        let target = infer_reshape_dims(x.dims(), shape)?;
        if output.dims() != &target {
            return Err(KernelError::invalid_shape(
                RESHAPE_OP,
                format!("output image has dims {}, expected {target}", output.dims()),
            ));
        }
        let program =
            ReshapeProgram::<P>::prepare(ctx, RESHAPE_OP, x.layout(), output.layout())?;
        let bind_group = program.bind(ctx, x, output);
        log::debug!(
            "reshape prepared: {} -> {} with '{}'",
            x.dims(),
            target,
            program.name()
        );
        self.prepared = Some(PreparedReshape {
            program,
            bind_group,
        });
        ctx.telemetry().record_prepare(started.elapsed().as_nanos() as u64);
        Ok(())
    }

    fn run(&mut self, ctx: &ImageContext) -> KernelResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or(KernelError::NotPrepared { op: RESHAPE_OP })?;
        let _span = info_span!(
            "kernel.run",
            op = RESHAPE_OP,
            program = prepared.program.name()
        )
        .entered();
        ctx.submit_with(RESHAPE_OP, "inferlite-reshape", |encoder| {
            prepared.program.encode(encoder, &prepared.bind_group);
        })?;
        prepared.program.record_submitted(ctx);
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_copies_and_minus_one_infers() {
        let input = DDim::from([2, 3, 4]);
        assert_eq!(
            infer_reshape_dims(&input, &[0, -1]).expect("dims"),
            DDim::from([2, 12])
        );
        assert_eq!(
            infer_reshape_dims(&input, &[4, 0, 2]).expect("dims"),
            DDim::from([4, 3, 2])
        );
        assert_eq!(
            infer_reshape_dims(&input, &[24]).expect("dims"),
            DDim::from([24])
        );
    }

    #[test]
    fn bad_targets_are_shape_errors() {
        let input = DDim::from([2, 3, 4]);
        for shape in [&[-1, -1][..], &[5, -1], &[7, 3], &[2, -3, 4], &[0, 0, 0, 0]] {
            let err = infer_reshape_dims(&input, shape).expect_err("invalid");
            assert!(
                matches!(err, KernelError::InvalidShape { op: RESHAPE_OP, .. }),
                "{shape:?}: {err}"
            );
        }
    }

    #[test]
    fn oversized_targets_are_shape_errors() {
        let input = DDim::from([2]);
        for shape in [&[i64::MAX, 4, -1][..], &[i64::MAX, 4], &[i64::MAX, i64::MAX]] {
            let err = infer_reshape_dims(&input, shape).expect_err("overflow");
            assert!(
                matches!(err, KernelError::InvalidShape { op: RESHAPE_OP, .. }),
                "{shape:?}: {err}"
            );
        }
    }
}
