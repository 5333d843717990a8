use super::{DatasetBase, Records};
use ndarray::Array1;

impl<R: Records, T> DatasetBase<R, T> {
    /// Create a new dataset from records and targets
    pub fn new(records: R, targets: T) -> DatasetBase<R, T> {
        DatasetBase {
            records,
            targets,
            weights: Array1::zeros(0),
        }
    }

    /// Attach per-sample weights; an empty array clears them
    pub fn with_weights(mut self, weights: Array1<f32>) -> DatasetBase<R, T> {
        self.weights = weights;
        self
    }

    /// Weight of a single sample, `1.0` when no weights are attached
    pub fn weight_for(&self, idx: usize) -> f32 {
        *self.weights.get(idx).unwrap_or(&1.0)
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    pub fn targets(&self) -> &T {
        &self.targets
    }

    pub fn nsamples(&self) -> usize {
        self.records.nsamples()
    }

    pub fn nfeatures(&self) -> usize {
        self.records.nfeatures()
    }
}

/// A dataset carrying only records
impl<R: Records> From<R> for DatasetBase<R, ()> {
    fn from(records: R) -> Self {
        DatasetBase {
            records,
            targets: (),
            weights: Array1::zeros(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Dataset;
    use ndarray::array;

    #[test]
    fn weight_for_defaults_to_one() {
        let dataset = Dataset::new(array![[1.0f64, 0.0], [0.0, 1.0]], array![true, false]);
        assert_eq!(dataset.weight_for(0), 1.0);
        assert_eq!(dataset.weight_for(1), 1.0);

        let dataset = dataset.with_weights(array![0.5, 2.0]);
        assert_eq!(dataset.weight_for(0), 0.5);
        assert_eq!(dataset.weight_for(1), 2.0);
    }

    #[test]
    fn shape_accessors() {
        let dataset = Dataset::new(array![[1.0f64, 0.0, 2.0]], array![true]);
        assert_eq!(dataset.nsamples(), 1);
        assert_eq!(dataset.nfeatures(), 3);
    }
}
