//! In-memory datasets and batch sampling.

use crate::error::GanError;
use crate::utils::scalar_f32;
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::Rng;

/// Images paired with their labels, one example per leading index.
///
/// Labels are not used by the adversarial objective; only their example count is checked.
#[derive(Debug, Clone)]
pub struct LabeledImages<B: Backend> {
    /// `[n, rows, columns, channels]`, values in `[0, 1]`.
    pub images: Tensor<B, 4>,
    /// `[n, k]`
    pub labels: Tensor<B, 2>,
}

impl<B: Backend> LabeledImages<B> {
    pub fn new(images: Tensor<B, 4>, labels: Tensor<B, 2>) -> Self {
        Self { images, labels }
    }

    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks shape, example count and pixel range.
    ///
    /// `image_field` and `label_field` name the offending input in the error.
    pub fn validate(
        &self,
        image_field: &str,
        label_field: &str,
        image_dims: [usize; 3],
    ) -> Result<(), GanError> {
        let [n, rows, columns, channels] = self.images.dims();
        if [rows, columns, channels] != image_dims {
            return Err(GanError::precondition(
                image_field,
                format!(
                    "expected images of shape {image_dims:?}, found [{rows}, {columns}, {channels}]"
                ),
            ));
        }
        if n == 0 {
            return Err(GanError::precondition(
                image_field,
                "must contain at least one example",
            ));
        }
        let [labelled, _] = self.labels.dims();
        if labelled != n {
            return Err(GanError::precondition(
                label_field,
                format!("expected {n} examples to match `{image_field}`, found {labelled}"),
            ));
        }

        let min = scalar_f32(self.images.clone().min());
        let max = scalar_f32(self.images.clone().max());
        if !(min >= 0.0 && max <= 1.0) {
            return Err(GanError::precondition(
                image_field,
                format!("pixel values must lie in [0, 1], found [{min}, {max}]"),
            ));
        }
        Ok(())
    }

    /// Draws `batch_size` images uniformly, with replacement.
    ///
    /// # Shapes
    ///   - Output [batch_size, rows, columns, channels]
    pub fn sample_batch<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Tensor<B, 4> {
        let n = self.len();
        let indices: Vec<i64> = (0..batch_size)
            .map(|_| rng.gen_range(0..n) as i64)
            .collect();
        let indices =
            Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [batch_size]), &self.images.device());
        self.images.clone().select(0, indices)
    }

    /// Consecutive slices of at most `size` images.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = Tensor<B, 4>> + '_ {
        let n = self.len();
        let size = size.max(1);
        (0..n)
            .step_by(size)
            .map(move |start| self.images.clone().narrow(0, start, size.min(n - start)))
    }
}

/// Training set plus optional validation and test sets.
#[derive(Debug, Clone)]
pub struct GanDatasets<B: Backend> {
    pub train: LabeledImages<B>,
    pub validation: Option<LabeledImages<B>>,
    pub test: Option<LabeledImages<B>>,
}

impl<B: Backend> GanDatasets<B> {
    pub fn new(train: LabeledImages<B>) -> Self {
        Self {
            train,
            validation: None,
            test: None,
        }
    }

    pub fn with_validation(mut self, validation: LabeledImages<B>) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_test(mut self, test: LabeledImages<B>) -> Self {
        self.test = Some(test);
        self
    }

    /// Validates every provided set against `image_dims`.
    pub fn validate(&self, image_dims: [usize; 3]) -> Result<(), GanError> {
        self.train.validate("x_train", "y_train", image_dims)?;
        if let Some(validation) = &self.validation {
            validation.validate("x_val", "y_val", image_dims)?;
        }
        if let Some(test) = &self.test {
            test.validate("x_test", "y_test", image_dims)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = NdArray;

    fn images(n: usize, value: f32) -> Tensor<TestBackend, 4> {
        Tensor::full([n, 4, 4, 1], value, &Default::default())
    }

    fn labels(n: usize) -> Tensor<TestBackend, 2> {
        Tensor::zeros([n, 10], &Default::default())
    }

    fn field_of(err: GanError) -> String {
        match err {
            GanError::Precondition { field, .. } => field,
            other => panic!("expected a precondition, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_counts_name_the_label_set() {
        let datasets = GanDatasets::new(LabeledImages::new(images(100, 0.5), labels(99)));
        let err = datasets.validate([4, 4, 1]).unwrap_err();
        assert_eq!(field_of(err), "y_train");
    }

    #[test]
    fn wrong_shapes_and_ranges_are_rejected() {
        let train = LabeledImages::new(images(3, 0.5), labels(3));
        assert_eq!(
            field_of(GanDatasets::new(train.clone()).validate([4, 5, 1]).unwrap_err()),
            "x_train"
        );

        let datasets = GanDatasets::new(train.clone())
            .with_validation(LabeledImages::new(images(2, 1.5), labels(2)));
        assert_eq!(field_of(datasets.validate([4, 4, 1]).unwrap_err()), "x_val");

        let datasets = GanDatasets::new(train.clone())
            .with_test(LabeledImages::new(images(2, 0.0), labels(3)));
        assert_eq!(field_of(datasets.validate([4, 4, 1]).unwrap_err()), "y_test");

        let empty = GanDatasets::new(LabeledImages::new(images(0, 0.5), labels(0)));
        assert_eq!(field_of(empty.validate([4, 4, 1]).unwrap_err()), "x_train");

        GanDatasets::new(train).validate([4, 4, 1]).unwrap();
    }

    #[test]
    fn batches_are_drawn_from_the_set() {
        let device = Default::default();
        let distinct = Tensor::<TestBackend, 1, Int>::arange(0..5, &device)
            .float()
            .div_scalar(4.0)
            .reshape([5, 1, 1, 1]);
        let set = LabeledImages::new(distinct, labels(5));
        let mut rng = StdRng::seed_from_u64(3);

        let batch = set.sample_batch(8, &mut rng);
        assert_eq!(batch.dims(), [8, 1, 1, 1]);
        let allowed = [0.0, 0.25, 0.5, 0.75, 1.0];
        let values = batch.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| allowed.contains(v)));
    }

    #[test]
    fn chunks_cover_every_image_once() {
        let set = LabeledImages::new(images(7, 0.5), labels(7));
        let sizes: Vec<_> = set.chunks(3).map(|chunk| chunk.dims()[0]).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }
}
