use smallvec::SmallVec;
use std::fmt;

/// Ordered tensor extents, outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DDim(SmallVec<[usize; 6]>);

impl DDim {
    pub fn new(dims: &[usize]) -> Self {
        Self(SmallVec::from_slice(dims))
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn get(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied()
    }

    /// Number of elements; 1 for a rank-0 descriptor. `None` on overflow.
    pub fn production(&self) -> Option<usize> {
        checked_product(&self.0)
    }

    /// Product of the extents in `start..end`. `None` on overflow.
    pub fn count(&self, start: usize, end: usize) -> Option<usize> {
        let end = end.min(self.0.len());
        checked_product(&self.0[start.min(end)..end])
    }

    pub fn has_zero_extent(&self) -> bool {
        self.0.iter().any(|&d| d == 0)
    }

    /// Collapse into `[prod(dims[..num_col_dims]), prod(dims[num_col_dims..])]`.
    ///
    /// Returns `None` unless `1 <= num_col_dims < rank`, or if either side
    /// overflows.
    pub fn flatten_to_2d(&self, num_col_dims: usize) -> Option<DDim> {
        if num_col_dims == 0 || num_col_dims >= self.rank() {
            return None;
        }
        Some(DDim::new(&[
            self.count(0, num_col_dims)?,
            self.count(num_col_dims, self.rank())?,
        ]))
    }
}

fn checked_product(extents: &[usize]) -> Option<usize> {
    extents.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl From<Vec<usize>> for DDim {
    fn from(dims: Vec<usize>) -> Self {
        Self(SmallVec::from_vec(dims))
    }
}

impl From<&[usize]> for DDim {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for DDim {
    fn from(dims: [usize; N]) -> Self {
        Self::new(&dims)
    }
}

impl fmt::Display for DDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
