use inferlite_kernel_api::{
    DDim, Kernel, KernelError, KernelInstance, KernelKey, KernelRegistry, KernelResult,
    LaunchState, Place, PrecisionType,
};
use std::cell::RefCell;

#[derive(Default)]
struct Journal {
    events: RefCell<Vec<&'static str>>,
}

struct RecordingKernel {
    dims: DDim,
    prepared_for: Option<DDim>,
    fail_prepare: bool,
}

impl RecordingKernel {
    fn new(dims: DDim) -> Self {
        Self {
            dims,
            prepared_for: None,
            fail_prepare: false,
        }
    }

    fn set_dims(&mut self, dims: DDim) {
        if Some(&dims) != self.prepared_for.as_ref() {
            self.prepared_for = None;
        }
        self.dims = dims;
    }
}

impl Kernel for RecordingKernel {
    type Context = Journal;

    fn op_type(&self) -> &'static str {
        "recording"
    }

    fn place(&self) -> Place {
        Place::wgpu_image(PrecisionType::Float)
    }

    fn prepare_for_run(&mut self, ctx: &Journal) -> KernelResult<()> {
        ctx.events.borrow_mut().push("prepare");
        if self.fail_prepare {
            return Err(KernelError::invalid_shape("recording", "forced failure"));
        }
        self.prepared_for = Some(self.dims.clone());
        Ok(())
    }

    fn run(&mut self, ctx: &Journal) -> KernelResult<()> {
        if self.prepared_for.is_none() {
            return Err(KernelError::NotPrepared { op: "recording" });
        }
        ctx.events.borrow_mut().push("run");
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared_for.is_some()
    }
}

#[test]
fn run_before_prepare_is_rejected() {
    let journal = Journal::default();
    let mut instance = KernelInstance::new(RecordingKernel::new(DDim::from([2, 3])));
    let err = instance.run(&journal).unwrap_err();
    assert_eq!(err, KernelError::NotPrepared { op: "recording" });
    assert!(journal.events.borrow().is_empty());
    assert_eq!(instance.launches(), 0);
}

#[test]
fn launch_prepares_once_then_runs_repeatedly() {
    let journal = Journal::default();
    let mut instance = KernelInstance::new(RecordingKernel::new(DDim::from([2, 3])));
    for _ in 0..3 {
        instance.launch(&journal).expect("launch");
    }
    assert_eq!(
        *journal.events.borrow(),
        vec!["prepare", "run", "run", "run"]
    );
    assert_eq!(instance.state(), &LaunchState::Ready);
    assert_eq!(instance.launches(), 3);
}

#[test]
fn failed_prepare_poisons_the_instance() {
    let journal = Journal::default();
    let mut kernel = RecordingKernel::new(DDim::from([2, 3]));
    kernel.fail_prepare = true;
    let mut instance = KernelInstance::new(kernel);

    let err = instance.launch(&journal).unwrap_err();
    assert!(err.is_initialization());
    assert!(matches!(instance.state(), LaunchState::Poisoned(_)));

    let again = instance.launch(&journal).unwrap_err();
    assert!(matches!(again, KernelError::Poisoned { op: "recording", .. }));
    // no second prepare attempt and never a run
    assert_eq!(*journal.events.borrow(), vec!["prepare"]);
}

#[test]
fn shape_change_triggers_one_re_prepare() {
    let journal = Journal::default();
    let mut instance = KernelInstance::new(RecordingKernel::new(DDim::from([2, 3])));
    instance.launch(&journal).unwrap();
    instance.kernel_mut().set_dims(DDim::from([4, 3]));
    instance.launch(&journal).unwrap();
    instance.launch(&journal).unwrap();
    assert_eq!(
        *journal.events.borrow(),
        vec!["prepare", "run", "prepare", "run", "run"]
    );
}

#[test]
fn registry_lookup_by_op_and_precision() {
    type Factory = fn() -> &'static str;
    let mut registry: KernelRegistry<Factory> = KernelRegistry::new();
    let float = KernelKey::new("mul", Place::wgpu_image(PrecisionType::Float));
    let half = KernelKey::new("mul", Place::wgpu_image(PrecisionType::Fp16));
    assert!(registry.register(float, || "mul-float").is_none());
    assert!(registry.register(half, || "mul-half").is_none());

    assert_eq!((registry.get(&half).unwrap())(), "mul-half");
    assert_eq!(
        registry.precisions_for("mul"),
        vec![PrecisionType::Float, PrecisionType::Fp16]
    );

    let missing = KernelKey::new("conv2d", Place::wgpu_image(PrecisionType::Float));
    let err = registry.get(&missing).unwrap_err();
    assert_eq!(err.to_string(), "no kernel registered for conv2d@wgpu/float/image2d-array");
}
