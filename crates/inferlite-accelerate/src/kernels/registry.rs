use inferlite_kernel_api::{
    Kernel, KernelError, KernelKey, KernelRegistry, KernelResult, Place, PrecisionType,
};

use super::mul::{MulImageKernel, MulParam, MUL_OP};
use super::reshape::{ReshapeImageKernel, ReshapeParam, RESHAPE_OP};
use crate::backend::wgpu::context::ImageContext;
use crate::backend::wgpu::types::{Float, Half, ImagePrecision};

/// Parameters handed to a registered factory.
pub enum OpParam<'a> {
    Mul(MulParam<'a>),
    Reshape(ReshapeParam<'a>),
}

impl OpParam<'_> {
    pub fn op(&self) -> &'static str {
        match self {
            OpParam::Mul(_) => MUL_OP,
            OpParam::Reshape(_) => RESHAPE_OP,
        }
    }
}

pub type BoxedImageKernel<'a> = Box<dyn Kernel<Context = ImageContext> + 'a>;

pub type ImageKernelFactory = for<'a> fn(OpParam<'a>) -> KernelResult<BoxedImageKernel<'a>>;

fn mul_factory<P: ImagePrecision>(param: OpParam<'_>) -> KernelResult<BoxedImageKernel<'_>> {
    match param {
        OpParam::Mul(p) => Ok(Box::new(MulImageKernel::<P>::new(p))),
        other => Err(KernelError::invalid_param(
            MUL_OP,
            format!("expected mul parameters, got {}", other.op()),
        )),
    }
}

fn reshape_factory<P: ImagePrecision>(param: OpParam<'_>) -> KernelResult<BoxedImageKernel<'_>> {
    match param {
        OpParam::Reshape(p) => Ok(Box::new(ReshapeImageKernel::<P>::new(p))),
        other => Err(KernelError::invalid_param(
            RESHAPE_OP,
            format!("expected reshape parameters, got {}", other.op()),
        )),
    }
}

/// Registry with the mul and reshape image kernels for float and half.
pub fn builtin_registry() -> KernelRegistry<ImageKernelFactory> {
    let mut registry = KernelRegistry::new();
    let float = Place::wgpu_image(PrecisionType::Float);
    let half = Place::wgpu_image(PrecisionType::Fp16);
    registry.register(KernelKey::new(MUL_OP, float), mul_factory::<Float> as ImageKernelFactory);
    registry.register(KernelKey::new(MUL_OP, half), mul_factory::<Half> as ImageKernelFactory);
    registry.register(
        KernelKey::new(RESHAPE_OP, float),
        reshape_factory::<Float> as ImageKernelFactory,
    );
    registry.register(
        KernelKey::new(RESHAPE_OP, half),
        reshape_factory::<Half> as ImageKernelFactory,
    );
    registry
}

/// Look up the factory for `param`'s op at `place` and build the kernel.
pub fn create_kernel<'a>(
    registry: &KernelRegistry<ImageKernelFactory>,
    place: Place,
    param: OpParam<'a>,
) -> KernelResult<BoxedImageKernel<'a>> {
    let factory = registry.get(&KernelKey::new(param.op(), place))?;
    factory(param)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_both_precisions() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.precisions_for(MUL_OP),
            vec![PrecisionType::Float, PrecisionType::Fp16]
        );
        assert_eq!(
            registry.precisions_for(RESHAPE_OP),
            vec![PrecisionType::Float, PrecisionType::Fp16]
        );
        assert!(registry.precisions_for("conv2d").is_empty());
    }
}
