use crate::{KernelError, KernelResult, Place};

/// Lifecycle every device kernel implements.
///
/// `prepare_for_run` performs the one-time work (shape analysis, program
/// selection, parameter packing); `run` is the hot path and may be called any
/// number of times against the prepared state.
pub trait Kernel {
    /// Device context the kernel allocates from and submits to.
    type Context;

    fn op_type(&self) -> &'static str;

    fn place(&self) -> Place;

    fn prepare_for_run(&mut self, ctx: &Self::Context) -> KernelResult<()>;

    fn run(&mut self, ctx: &Self::Context) -> KernelResult<()>;

    /// False until preparation succeeds, and again after anything that
    /// invalidates the prepared resources (for example new operand shapes).
    fn is_prepared(&self) -> bool;
}

impl<K: Kernel + ?Sized> Kernel for Box<K> {
    type Context = K::Context;

    fn op_type(&self) -> &'static str {
        (**self).op_type()
    }

    fn place(&self) -> Place {
        (**self).place()
    }

    fn prepare_for_run(&mut self, ctx: &Self::Context) -> KernelResult<()> {
        (**self).prepare_for_run(ctx)
    }

    fn run(&mut self, ctx: &Self::Context) -> KernelResult<()> {
        (**self).run(ctx)
    }

    fn is_prepared(&self) -> bool {
        (**self).is_prepared()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchState {
    Uninitialized,
    Ready,
    /// Preparation failed; the message of the original error is kept.
    Poisoned(String),
}

/// Scheduler-side wrapper that enforces `prepare_for_run` before `run`.
pub struct KernelInstance<K> {
    kernel: K,
    state: LaunchState,
    launches: u64,
}

impl<K: Kernel> KernelInstance<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            state: LaunchState::Uninitialized,
            launches: 0,
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn state(&self) -> &LaunchState {
        &self.state
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    pub fn prepare(&mut self, ctx: &K::Context) -> KernelResult<()> {
        if let LaunchState::Poisoned(reason) = &self.state {
            return Err(KernelError::Poisoned {
                op: self.kernel.op_type(),
                reason: reason.clone(),
            });
        }
        match self.kernel.prepare_for_run(ctx) {
            Ok(()) => {
                self.state = LaunchState::Ready;
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "{} kernel ({}) failed to prepare: {err}",
                    self.kernel.op_type(),
                    self.kernel.place()
                );
                self.state = LaunchState::Poisoned(err.to_string());
                Err(err)
            }
        }
    }

    /// Run an already prepared kernel. Re-prepares if the kernel dropped its
    /// prepared resources since the last launch.
    pub fn run(&mut self, ctx: &K::Context) -> KernelResult<()> {
        match &self.state {
            LaunchState::Uninitialized => {
                return Err(KernelError::NotPrepared {
                    op: self.kernel.op_type(),
                })
            }
            LaunchState::Poisoned(reason) => {
                return Err(KernelError::Poisoned {
                    op: self.kernel.op_type(),
                    reason: reason.clone(),
                })
            }
            LaunchState::Ready => {}
        }
        if !self.kernel.is_prepared() {
            log::debug!(
                "{} kernel lost its prepared state; preparing again",
                self.kernel.op_type()
            );
            self.prepare(ctx)?;
        }
        self.kernel.run(ctx)?;
        self.launches += 1;
        Ok(())
    }

    /// Prepare on first use, then run.
    pub fn launch(&mut self, ctx: &K::Context) -> KernelResult<()> {
        if self.state == LaunchState::Uninitialized {
            self.prepare(ctx)?;
        }
        self.run(ctx)
    }
}
