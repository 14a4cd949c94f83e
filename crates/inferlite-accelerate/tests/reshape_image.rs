use std::sync::Mutex;

use inferlite_accelerate::{
    builtin_registry, create_kernel, Float, Half, ImageContext, ImageContextOptions, MulParam,
    OpParam, ReshapeImageKernel, ReshapeParam,
};
use inferlite_kernel_api::{
    Kernel, KernelError, KernelInstance, Place, PrecisionType, TargetType,
};
use inferlite_logging::{init_logging, LoggingOptions};
use once_cell::sync::Lazy;

static TEST_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

static CONTEXT: Lazy<Option<ImageContext>> = Lazy::new(|| {
    let _ = init_logging(LoggingOptions {
        enable_fmt: true,
        enable_spans: false,
    });
    match ImageContext::new(ImageContextOptions::default()) {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("skipping GPU reshape tests: {err}");
            None
        }
    }
});

fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|v| v as f32).collect()
}

#[test]
fn reshape_preserves_row_major_order() {
    let _guard = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let Some(ctx) = CONTEXT.as_ref() else { return };
    let values = ramp(24);
    let x = ctx.upload_image::<Float>(&values, [2usize, 3, 4]).expect("upload");
    let out = ctx.create_image::<Float>([4usize, 6]).expect("output");
    let mut kernel = ReshapeImageKernel::<Float>::new(ReshapeParam {
        x: &x,
        output: &out,
        shape: vec![4, -1],
    });
    kernel.prepare_for_run(ctx).expect("prepare");
    assert_eq!(kernel.program_name(), Some("reshape"));
    kernel.run(ctx).expect("run");
    assert_eq!(ctx.download_image(&out).expect("download"), values);
}

#[test]
fn reshape_unpacks_channel_slices() {
    let _guard = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let Some(ctx) = CONTEXT.as_ref() else { return };
    // six channels span two texel slices per batch item
    let values = ramp(2 * 6 * 2 * 2);
    let x = ctx
        .upload_image::<Half>(&values, [2usize, 6, 2, 2])
        .expect("upload");
    let out = ctx.create_image::<Half>([12usize, 4]).expect("output");
    let mut instance = KernelInstance::new(ReshapeImageKernel::<Half>::new(ReshapeParam {
        x: &x,
        output: &out,
        shape: vec![-1, 4],
    }));
    instance.launch(ctx).expect("launch");
    // integers below 2048 are exact in half precision
    assert_eq!(ctx.download_image(&out).expect("download"), values);
}

#[test]
fn reshape_rejects_wrong_output_dims() {
    let _guard = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let Some(ctx) = CONTEXT.as_ref() else { return };
    let x = ctx.upload_image::<Float>(&ramp(6), [2usize, 3]).expect("upload");
    let out = ctx.create_image::<Float>([2usize, 3]).expect("output");
    let mut kernel = ReshapeImageKernel::<Float>::new(ReshapeParam {
        x: &x,
        output: &out,
        shape: vec![3, 2],
    });
    assert!(matches!(
        kernel.prepare_for_run(ctx),
        Err(KernelError::InvalidShape { op: "reshape", .. })
    ));
}

#[test]
fn registry_builds_kernels_by_place() {
    let _guard = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let Some(ctx) = CONTEXT.as_ref() else { return };
    let registry = builtin_registry();
    let x = ctx.upload_image::<Float>(&ramp(6), [2usize, 3]).expect("upload");
    let y = ctx.upload_image::<Float>(&ramp(12), [3usize, 4]).expect("upload");
    let out = ctx.create_image::<Float>([2usize, 4]).expect("output");

    let place = Place::wgpu_image(PrecisionType::Float);
    let mut kernel =
        create_kernel(&registry, place, OpParam::Mul(MulParam::new(&x, &y, &out))).expect("mul");
    assert_eq!(kernel.op_type(), "mul");
    assert_eq!(kernel.place(), place);
    kernel.prepare_for_run(ctx).expect("prepare");
    kernel.run(ctx).expect("run");
    let got = ctx.download_image(&out).expect("download");
    assert_eq!(got.len(), 8);
    // row 0 of x is [0, 1, 2]; column 0 of y is [0, 4, 8]
    assert!((got[0] - 20.0).abs() < 1e-4);

    let host = Place {
        target: TargetType::Host,
        ..place
    };
    let err = create_kernel(&registry, host, OpParam::Mul(MulParam::new(&x, &y, &out)))
        .err()
        .expect("no host kernel");
    assert!(matches!(err, KernelError::NotRegistered { .. }));
}
