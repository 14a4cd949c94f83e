//! InferLite kernel API
//!
//! Backend-agnostic contracts shared by the scheduler and the device backends:
//! - [`DDim`]: tensor shape descriptor.
//! - [`Place`]: target / precision / data-layout tag a kernel is specialised for.
//! - [`Kernel`]: the `prepare_for_run` / `run` lifecycle every kernel implements.
//! - [`KernelInstance`]: lifecycle guard the scheduler drives kernels through.
//! - [`KernelRegistry`]: lookup table from `(op, place)` to a backend factory.

mod dim;
mod error;
mod kernel;
mod place;
mod registry;

pub use dim::DDim;
pub use error::{KernelError, KernelResult};
pub use kernel::{Kernel, KernelInstance, LaunchState};
pub use place::{DataLayoutType, Place, PrecisionType, TargetType};
pub use registry::{KernelKey, KernelRegistry};
