use std::sync::Arc;
use std::time::Instant;

use inferlite_kernel_api::{DDim, Kernel, KernelError, KernelResult, Place};
use serde::Serialize;
use tracing::info_span;

use super::reshape::{ensure_precision, ReshapeStage};
use crate::backend::wgpu::context::ImageContext;
use crate::backend::wgpu::dispatch::common::{encode_pass, image_grid};
use crate::backend::wgpu::image::DeviceImage;
use crate::backend::wgpu::params::MulParams;
use crate::backend::wgpu::pipelines::{PipelineBundle, ProgramKind};
use crate::backend::wgpu::types::{Float, Half, ImagePrecision};

pub const MUL_OP: &str = "mul";

/// Operands of a mul op. Each operand is viewed as a matrix by collapsing
/// the first `num_col_dims` extents into rows and the rest into columns.
pub struct MulParam<'a> {
    pub x: &'a DeviceImage,
    pub y: &'a DeviceImage,
    pub output: &'a DeviceImage,
    pub x_num_col_dims: usize,
    pub y_num_col_dims: usize,
}

impl<'a> MulParam<'a> {
    pub fn new(x: &'a DeviceImage, y: &'a DeviceImage, output: &'a DeviceImage) -> Self {
        Self {
            x,
            y,
            output,
            x_num_col_dims: 1,
            y_num_col_dims: 1,
        }
    }

    pub fn with_num_col_dims(mut self, x_num_col_dims: usize, y_num_col_dims: usize) -> Self {
        self.x_num_col_dims = x_num_col_dims;
        self.y_num_col_dims = y_num_col_dims;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MulShape {
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

/// Shape analysis for one mul invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulPlan {
    pub x_matrix: DDim,
    pub y_matrix: DDim,
    pub shape: MulShape,
    /// `x` must be repacked into `x_matrix` before the product.
    pub insert_x_shape: bool,
    /// `y` must be repacked into `y_matrix` before the product.
    pub insert_shape: bool,
}

fn operand_matrix(name: &str, dims: &DDim, num_col_dims: usize) -> KernelResult<DDim> {
    if dims.rank() > 4 {
        return Err(KernelError::invalid_shape(
            MUL_OP,
            format!("{name} has rank {} ({dims}); at most 4 is supported", dims.rank()),
        ));
    }
    if dims.has_zero_extent() {
        return Err(KernelError::invalid_shape(
            MUL_OP,
            format!("{name} has a zero-sized extent ({dims})"),
        ));
    }
    if num_col_dims == 0 || num_col_dims >= dims.rank() {
        return Err(KernelError::invalid_shape(
            MUL_OP,
            format!(
                "{name}_num_col_dims={num_col_dims} must be in 1..{} for {name} dims {dims}",
                dims.rank()
            ),
        ));
    }
    dims.flatten_to_2d(num_col_dims).ok_or_else(|| {
        KernelError::invalid_shape(
            MUL_OP,
            format!("{name} dims {dims} overflow when flattened at {num_col_dims}"),
        )
    })
}

pub fn plan_mul(
    x: &DDim,
    y: &DDim,
    output: &DDim,
    x_num_col_dims: usize,
    y_num_col_dims: usize,
) -> KernelResult<MulPlan> {
    let x_matrix = operand_matrix("x", x, x_num_col_dims)?;
    let y_matrix = operand_matrix("y", y, y_num_col_dims)?;
    let (m, k) = (x_matrix.dims()[0], x_matrix.dims()[1]);
    let (y_rows, n) = (y_matrix.dims()[0], y_matrix.dims()[1]);
    if k != y_rows {
        return Err(KernelError::invalid_shape(
            MUL_OP,
            format!("inner dimensions differ: x {x} -> {x_matrix}, y {y} -> {y_matrix}"),
        ));
    }
    let expected = DDim::from([m, n]);
    if output != &expected {
        return Err(KernelError::invalid_shape(
            MUL_OP,
            format!("output image has dims {output}, expected {expected}"),
        ));
    }
    Ok(MulPlan {
        insert_x_shape: x_matrix != *x,
        insert_shape: y_matrix != *y,
        x_matrix,
        y_matrix,
        shape: MulShape { m, k, n },
    })
}

struct PreparedMul<P: ImagePrecision> {
    plan: MulPlan,
    x_stage: Option<ReshapeStage<P>>,
    y_stage: Option<ReshapeStage<P>>,
    program: Arc<PipelineBundle>,
    // bound through `bind_group`; kept alive alongside the program
    _params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    grid: (u32, u32, u32),
}

/// Matrix multiplication over device images, generic over the storage
/// precision.
pub struct MulImageKernel<'a, P: ImagePrecision> {
    param: MulParam<'a>,
    prepared: Option<PreparedMul<P>>,
}

pub type MulImageCompute<'a> = MulImageKernel<'a, Float>;
pub type MulImageComputeHalf<'a> = MulImageKernel<'a, Half>;

impl<'a, P: ImagePrecision> MulImageKernel<'a, P> {
    pub fn new(param: MulParam<'a>) -> Self {
        Self {
            param,
            prepared: None,
        }
    }

    pub fn param(&self) -> &MulParam<'a> {
        &self.param
    }

    /// Replace the operands; prepared state is dropped and rebuilt on the
    /// next launch.
    pub fn set_param(&mut self, param: MulParam<'a>) {
        self.param = param;
        self.prepared = None;
    }

    /// Whether `y` is repacked before the product. False until prepared.
    pub fn insert_shape(&self) -> bool {
        self.prepared.as_ref().is_some_and(|p| p.plan.insert_shape)
    }

    pub fn insert_x_shape(&self) -> bool {
        self.prepared.as_ref().is_some_and(|p| p.plan.insert_x_shape)
    }

    pub fn mul_shape(&self) -> Option<MulShape> {
        self.prepared.as_ref().map(|p| p.plan.shape)
    }

    pub fn program_name(&self) -> Option<&str> {
        self.prepared.as_ref().map(|p| p.program.name.as_str())
    }
}

impl<'a, P: ImagePrecision> Kernel for MulImageKernel<'a, P> {
    type Context = ImageContext;

    fn op_type(&self) -> &'static str {
        MUL_OP
    }

    fn place(&self) -> Place {
        Place::wgpu_image(P::PRECISION)
    }

    fn prepare_for_run(&mut self, ctx: &ImageContext) -> KernelResult<()> {
        let _span = info_span!(
            "kernel.prepare",
            op = MUL_OP,
            precision = P::PRECISION.as_str()
        )
        .entered();
        let started = Instant::now();
        self.prepared = None;
        let MulParam {
            x,
            y,
            output,
            x_num_col_dims,
            y_num_col_dims,
        } = self.param;
        ensure_precision::<P>(MUL_OP, "x", x)?;
        ensure_precision::<P>(MUL_OP, "y", y)?;
        ensure_precision::<P>(MUL_OP, "output", output)?;
        if output.same_texture(x) || output.same_texture(y) {
            return Err(KernelError::invalid_param(
                MUL_OP,
                "output image aliases an input",
            ));
        }

        let plan = plan_mul(
            x.dims(),
            y.dims(),
            output.dims(),
            x_num_col_dims,
            y_num_col_dims,
        )?;
        let x_stage = if plan.insert_x_shape {
            Some(ReshapeStage::<P>::prepare(ctx, MUL_OP, x, plan.x_matrix.clone())?)
        } else {
            None
        };
        let y_stage = if plan.insert_shape {
            Some(ReshapeStage::<P>::prepare(ctx, MUL_OP, y, plan.y_matrix.clone())?)
        } else {
            None
        };

        let tile = ctx.tile_for(output.layout());
        let program = ctx.program::<P>(ProgramKind::Mul, tile)?;
        let MulShape { m, k, n } = plan.shape;
        let params =
            ctx.create_param_buffer(MUL_OP, "inferlite-mul-params", &MulParams::new(m, k, n))?;

        let x_eff = x_stage.as_ref().map_or(x, |s| s.output());
        let y_eff = y_stage.as_ref().map_or(y, |s| s.output());
        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("inferlite-mul-bind"),
            layout: &program.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(x_eff.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(y_eff.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(output.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        log::debug!(
            "mul prepared: x {} y {} -> [{m}, {n}] (k={k}) program '{}' tile {tile} \
             insert_x_shape={} insert_shape={}",
            x.dims(),
            y.dims(),
            program.name,
            plan.insert_x_shape,
            plan.insert_shape,
        );
        self.prepared = Some(PreparedMul {
            grid: image_grid(output.layout(), tile),
            plan,
            x_stage,
            y_stage,
            program,
            _params: params,
            bind_group,
        });
        ctx.telemetry().record_prepare(started.elapsed().as_nanos() as u64);
        Ok(())
    }

    fn run(&mut self, ctx: &ImageContext) -> KernelResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or(KernelError::NotPrepared { op: MUL_OP })?;
        let _span = info_span!(
            "kernel.run",
            op = MUL_OP,
            program = prepared.program.name.as_str()
        )
        .entered();
        let started = Instant::now();
        let stages = || prepared.x_stage.iter().chain(prepared.y_stage.iter());
        ctx.submit_with(MUL_OP, "inferlite-mul", |encoder| {
            for stage in stages() {
                stage.encode(encoder);
            }
            encode_pass(
                encoder,
                &prepared.program.name,
                &prepared.program.pipeline,
                &prepared.bind_group,
                prepared.grid,
            );
        })?;
        for stage in stages() {
            stage.record_submitted(ctx);
        }
        ctx.telemetry().record_dispatch(&prepared.program.name);
        ctx.telemetry().record_mul(started.elapsed().as_nanos() as u64);
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(x: &[usize], y: &[usize], out: &[usize]) -> KernelResult<MulPlan> {
        plan_mul(&DDim::new(x), &DDim::new(y), &DDim::new(out), 1, 1)
    }

    #[test]
    fn rank_two_operands_need_no_reshape() {
        let p = plan(&[2, 3], &[3, 4], &[2, 4]).expect("plan");
        assert_eq!(p.shape, MulShape { m: 2, k: 3, n: 4 });
        assert!(!p.insert_shape);
        assert!(!p.insert_x_shape);
    }

    #[test]
    fn trailing_unit_dims_on_y_insert_reshape() {
        let p = plan(&[2, 3], &[3, 4, 1, 1], &[2, 4]).expect("plan");
        assert!(p.insert_shape);
        assert_eq!(p.y_matrix, DDim::from([3, 4]));
        assert_eq!(p.shape, MulShape { m: 2, k: 3, n: 4 });
    }

    #[test]
    fn num_col_dims_collapse_leading_axes() {
        let p = plan_mul(
            &DDim::from([2, 3, 5]),
            &DDim::from([5, 4]),
            &DDim::from([6, 4]),
            2,
            1,
        )
        .expect("plan");
        assert!(p.insert_x_shape);
        assert_eq!(p.x_matrix, DDim::from([6, 5]));
        assert_eq!(p.shape, MulShape { m: 6, k: 5, n: 4 });
    }

    #[test]
    fn mismatches_are_shape_errors() {
        let cases: [(&[usize], &[usize], &[usize]); 5] = [
            (&[2, 3], &[4, 5], &[2, 5]),
            (&[2, 3], &[3, 4], &[4, 2]),
            (&[2, 0], &[0, 4], &[2, 4]),
            (&[2, 3], &[3, 1, 1, 1, 4], &[2, 4]),
            (&[6], &[6, 1], &[1, 1]),
        ];
        for (x, y, out) in cases {
            let err = plan(x, y, out).expect_err("invalid");
            assert!(
                matches!(err, KernelError::InvalidShape { op: MUL_OP, .. }),
                "{x:?} x {y:?}: {err}"
            );
            assert!(err.is_initialization());
        }
    }

    #[test]
    fn overflowing_flatten_is_a_shape_error() {
        let err = plan_mul(
            &DDim::from([usize::MAX, 2, 3]),
            &DDim::from([3, 4]),
            &DDim::from([2, 4]),
            2,
            1,
        )
        .expect_err("overflow");
        assert!(matches!(err, KernelError::InvalidShape { op: MUL_OP, .. }), "{err}");
    }
}
