use burn::prelude::*;
use burn::tensor::activation::softmax;

use crate::error::{HeadError, Result};

/// Turns per-edge distribution logits into expected distances.
///
/// The support is `{0, 1, ..., reg_max}` in units of the level's stride. The
/// same instance is used for loss targets and for inference decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Integral {
    pub reg_max: usize,
}

impl Integral {
    pub fn new(reg_max: usize) -> Self {
        Self { reg_max }
    }

    pub fn num_bins(&self) -> usize {
        self.reg_max + 1
    }

    /// The support `[0, 1, ..., reg_max]`.
    pub fn project<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        Tensor::<B, 1, Int>::arange(0..self.num_bins() as i64, device).float()
    }

    /// Decodes a tensor whose last dimension holds `4 * (reg_max + 1)` logits
    /// (left, top, right, bottom) into one whose last dimension holds the 4
    /// distances. Leading dimensions are preserved.
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Result<Tensor<B, D>> {
        let dims = x.dims();
        let bins = self.num_bins();
        let expected = 4 * bins;
        if dims[D - 1] != expected {
            return Err(HeadError::DistributionShape {
                expected,
                actual: dims[D - 1],
            });
        }

        let rows = dims.iter().product::<usize>() / bins;
        let flat: Tensor<B, 2> = x.reshape([rows, bins]);
        let prob = softmax(flat, 1);
        let proj: Tensor<B, 2> = self.project::<B>(&prob.device()).reshape([1, bins]);
        // Softmax mass can exceed 1 by an ulp in f32.
        let dist = (prob * proj).sum_dim(1).clamp(0.0, self.reg_max as f64); // [rows, 1]

        let mut out = dims;
        out[D - 1] = 4;
        Ok(dist.reshape(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type B = NdArray;

    #[test]
    fn one_hot_decodes_to_bin_index() {
        let device = Default::default();
        let integral = Integral::new(7);
        let picks = [0usize, 3, 7, 5];
        let mut logits = vec![0.0f32; 32];
        for (edge, &k) in picks.iter().enumerate() {
            logits[edge * 8 + k] = 1000.0;
        }
        let x = Tensor::<B, 2>::from_data(TensorData::new(logits, [1, 32]), &device);
        let out = integral.forward(x).unwrap();
        assert_eq!(out.dims(), [1, 4]);
        assert_eq!(out.into_data().to_vec::<f32>().unwrap(), vec![0.0, 3.0, 7.0, 5.0]);
    }

    #[test]
    fn uniform_logits_decode_to_midpoint() {
        let device = Default::default();
        let integral = Integral::new(7);
        let x = Tensor::<B, 3>::zeros([1, 6, 32], &device);
        let out = integral.forward(x).unwrap();
        assert_eq!(out.dims(), [1, 6, 4]);
        for v in out.into_data().to_vec::<f32>().unwrap() {
            assert!((v - 3.5).abs() < 1e-5);
        }
    }

    #[test]
    fn decoded_distances_stay_in_support() {
        let device = Default::default();
        let integral = Integral::new(7);
        let x = Tensor::<B, 3>::random([2, 50, 32], Distribution::Normal(0.0, 20.0), &device);
        for v in integral.forward(x).unwrap().into_data().to_vec::<f32>().unwrap() {
            assert!((0.0..=7.0).contains(&v), "decoded {v} outside [0, 7]");
        }
    }

    #[test]
    fn dominant_end_bins_never_leave_support() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let device = Default::default();
        let integral = Integral::new(7);
        let mut rng = StdRng::seed_from_u64(3);
        let rows = 4096;
        let mut logits = Vec::with_capacity(rows * 32);
        for row in 0..rows {
            let sigma = 1.0 + (row % 50) as f32;
            let boost = (row % 21) as f32;
            let peak = if row % 2 == 0 { 7 } else { 0 };
            for k in 0..32 {
                let noise = (rng.gen::<f32>() - 0.5) * 2.0 * sigma;
                let lift = if k % 8 == peak { boost } else { 0.0 };
                logits.push(noise + lift);
            }
        }
        let x = Tensor::<B, 2>::from_data(TensorData::new(logits, [rows, 32]), &device);
        let values = integral.forward(x).unwrap().into_data().to_vec::<f32>().unwrap();
        assert_eq!(values.len(), rows * 4);
        for v in values {
            assert!((0.0..=7.0).contains(&v), "decoded {v} outside [0, 7]");
        }
    }

    #[test]
    fn rejects_wrong_bin_count() {
        let device = Default::default();
        let x = Tensor::<B, 2>::zeros([3, 30], &device);
        assert!(matches!(
            Integral::new(7).forward(x),
            Err(HeadError::DistributionShape { expected: 32, actual: 30 })
        ));
    }
}
