//! Burn models for steering-angle regression.
//!
//! `SteeringNet` maps a single-channel edge map `[B, 1, H, W]` to one
//! unbounded steering value `[B, 1]`. It is a stack of identical blocks
//! (conv + ReLU, 2x2 average pool, additive Gaussian noise, dropout)
//! followed by a linear head. Noise and dropout only act on autodiff
//! backends, so `model.valid()` is deterministic.
//!
//! These are pure Burn modules; loading data and the training loop live in
//! the `training` crate.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::{backend::Backend, Distribution, Tensor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringNetConfig {
    pub input_height: usize,
    pub input_width: usize,
    /// Output channels of each conv block; one pooling halving per entry.
    pub channels: Vec<usize>,
    pub kernel_size: usize,
    pub dropout: f64,
    pub noise_std: f64,
    /// Coefficient of the squared-L2 penalty on conv kernels.
    pub l2_penalty: f64,
}

impl Default for SteeringNetConfig {
    fn default() -> Self {
        Self {
            input_height: 32,
            input_width: 128,
            channels: vec![4, 8, 16, 8, 4],
            kernel_size: 5,
            dropout: 0.1,
            noise_std: 0.1,
            l2_penalty: 0.001,
        }
    }
}

impl SteeringNetConfig {
    /// Spatial size `(h, w)` after every block has pooled once.
    pub fn output_hw(&self) -> (usize, usize) {
        let shift = self.channels.len() as u32;
        (
            self.input_height.checked_shr(shift).unwrap_or(0),
            self.input_width.checked_shr(shift).unwrap_or(0),
        )
    }

    /// Length of the flattened feature vector fed to the head.
    pub fn head_inputs(&self) -> usize {
        let (h, w) = self.output_hw();
        self.channels.last().copied().unwrap_or(1) * h * w
    }
}

/// Additive zero-mean Gaussian noise, applied during training only.
#[derive(Module, Clone, Debug)]
pub struct GaussianNoise {
    pub std: f64,
}

impl GaussianNoise {
    pub fn new(std: f64) -> Self {
        Self { std }
    }

    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        if !B::ad_enabled() || self.std <= 0.0 {
            return input;
        }
        let noise = Tensor::random(
            input.shape(),
            Distribution::Normal(0.0, self.std),
            &input.device(),
        );
        input + noise
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pool: AvgPool2d,
    noise: GaussianNoise,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    fn new(
        channels: [usize; 2],
        kernel: usize,
        noise_std: f64,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        let pool = AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self {
            conv,
            pool,
            noise: GaussianNoise::new(noise_std),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv.forward(input));
        let x = self.pool.forward(x);
        let x = self.noise.forward(x);
        self.dropout.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct SteeringNet<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    head: Linear<B>,
    pub config: Ignored<SteeringNetConfig>,
}

impl<B: Backend> SteeringNet<B> {
    pub fn new(config: SteeringNetConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.channels.len());
        let mut in_channels = 1;
        for &out_channels in &config.channels {
            blocks.push(ConvBlock::new(
                [in_channels, out_channels],
                config.kernel_size,
                config.noise_std,
                config.dropout,
                device,
            ));
            in_channels = out_channels;
        }
        let head = LinearConfig::new(config.head_inputs(), 1)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        Self {
            blocks,
            head,
            config: Ignored(config),
        }
    }

    /// `[B, 1, H, W]` edge maps to `[B, 1]` steering predictions.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x: Tensor<B, 2> = x.flatten(1, 3);
        self.head.forward(x)
    }

    /// `l2_penalty * sum(w^2)` over the conv kernels (biases excluded).
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let device = self.head.weight.val().device();
        let mut total = Tensor::<B, 1>::zeros([1], &device);
        for block in &self.blocks {
            total = total + block.conv.weight.val().powf_scalar(2.0).sum();
        }
        total.mul_scalar(self.config.l2_penalty)
    }

    /// Mean squared error plus the weight penalty; the training objective.
    pub fn loss(&self, preds: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        self.mse(preds, targets) + self.l2_penalty()
    }

    pub fn mse(&self, preds: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        MseLoss::new().forward(preds, targets, Reduction::Mean)
    }

    pub fn blocks(&self) -> &[ConvBlock<B>] {
        &self.blocks
    }
}

pub mod prelude {
    pub use super::{ConvBlock, GaussianNoise, SteeringNet, SteeringNetConfig};
}
