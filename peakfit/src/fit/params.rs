//! Packed parameter vector with per-parameter free/fixed flags and bounds.

/// Values, vary flags and box bounds for every model parameter.
///
/// Fixed parameters are never touched by the optimizer, so their values come
/// out bit-identical to what went in.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    values: Vec<f64>,
    vary: Vec<bool>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl ParameterSet {
    /// All parameters free and unbounded.
    pub fn new(values: Vec<f64>) -> Self {
        let n = values.len();
        Self {
            values,
            vary: vec![true; n],
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    #[inline]
    pub fn is_free(&self, index: usize) -> bool {
        self.vary[index]
    }

    #[inline]
    pub fn bounds(&self, index: usize) -> (f64, f64) {
        (self.lower[index], self.upper[index])
    }

    pub fn set_bounds(&mut self, index: usize, lower: f64, upper: f64) {
        debug_assert!(lower <= upper, "lower bound above upper bound");
        self.lower[index] = lower;
        self.upper[index] = upper;
    }

    /// Freeze `index` at `value`.
    pub fn fix_at(&mut self, index: usize, value: f64) {
        self.values[index] = value;
        self.vary[index] = false;
    }

    /// Freeze `index` at its current value.
    pub fn fix(&mut self, index: usize) {
        self.vary[index] = false;
    }

    pub fn free_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.vary[i]).collect()
    }

    /// Replace all values, e.g. with a converged solution.
    pub fn set_values(&mut self, values: &[f64]) {
        assert_eq!(values.len(), self.values.len(), "parameter count mismatch");
        self.values.copy_from_slice(values);
    }

    /// Clamp the free entries of `values` into their bounds.
    pub fn project(&self, values: &mut [f64]) {
        for (i, v) in values.iter_mut().enumerate() {
            if self.vary[i] {
                *v = v.clamp(self.lower[i], self.upper[i]);
            }
        }
    }
}
