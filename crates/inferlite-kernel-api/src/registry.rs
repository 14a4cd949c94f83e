use crate::{KernelError, KernelResult, Place, PrecisionType};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub op: &'static str,
    pub place: Place,
}

impl KernelKey {
    pub const fn new(op: &'static str, place: Place) -> Self {
        Self { op, place }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.op, self.place)
    }
}

/// Factory table keyed by op name and placement.
///
/// `F` is backend specific; the wgpu backend stores plain function pointers
/// that build a boxed kernel from the op parameters.
pub struct KernelRegistry<F> {
    factories: HashMap<KernelKey, F>,
}

impl<F> Default for KernelRegistry<F> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<F> KernelRegistry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory`, returning the one it replaced, if any.
    pub fn register(&mut self, key: KernelKey, factory: F) -> Option<F> {
        let previous = self.factories.insert(key, factory);
        if previous.is_some() {
            log::debug!("kernel registry: replaced factory for {key}");
        }
        previous
    }

    pub fn get(&self, key: &KernelKey) -> KernelResult<&F> {
        self.factories
            .get(key)
            .ok_or_else(|| KernelError::NotRegistered {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &KernelKey) -> bool {
        self.factories.contains_key(key)
    }

    /// Precisions registered for `op`, sorted for stable output.
    pub fn precisions_for(&self, op: &str) -> Vec<PrecisionType> {
        let mut out: Vec<PrecisionType> = self
            .factories
            .keys()
            .filter(|k| k.op == op)
            .map(|k| k.place.precision)
            .collect();
        out.sort_by_key(|p| p.as_str());
        out.dedup();
        out
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
