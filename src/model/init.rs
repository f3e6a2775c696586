use burn::module::Param;
use burn::nn::conv::Conv2d;
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use super::level::LevelHead;

/// Outcome of a weight initialization pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightInitReport {
    pub levels: usize,
    pub convs_initialized: usize,
    pub cls_bias: f64,
    pub seed: u64,
}

/// Fills `conv.weight` with N(0, std) draws from `rng` and sets every bias entry to `bias`.
pub fn normal_init<B: Backend>(conv: &mut Conv2d<B>, normal: &Normal<f32>, bias: f64, rng: &mut StdRng) {
    let weight = conv.weight.val();
    let dims = weight.dims();
    let device = weight.device();

    let values: Vec<f32> = (0..dims.iter().product::<usize>())
        .map(|_| normal.sample(rng))
        .collect();
    let data = TensorData::new(values, dims).convert::<B::FloatElem>();
    conv.weight = Param::from_tensor(Tensor::from_data(data, &device));

    if let Some(b) = &conv.bias {
        let [n] = b.val().dims();
        conv.bias = Some(Param::from_tensor(Tensor::full([n], bias, &device)));
    }
}

/// Initializes one level in a fixed order: cls stack, reg stack, cls projection,
/// reg projection. Returns the number of convolutions touched.
pub(crate) fn init_level<B: Backend>(
    level: &mut LevelHead<B>,
    normal: &Normal<f32>,
    cls_bias: f64,
    rng: &mut StdRng,
) -> usize {
    let mut count = 0;
    for conv in level.cls_convs.convs_mut() {
        normal_init(conv, normal, 0.0, rng);
        count += 1;
    }
    if let Some(reg) = level.reg.as_mut() {
        for conv in reg.convs.convs_mut() {
            normal_init(conv, normal, 0.0, rng);
            count += 1;
        }
    }

    normal_init(&mut level.gfl_cls, normal, cls_bias, rng);
    count += 1;
    if let Some(reg) = level.reg.as_mut() {
        normal_init(&mut reg.gfl_reg, normal, 0.0, rng);
        count += 1;
    }
    count
}
