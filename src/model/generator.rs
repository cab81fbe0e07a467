use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation,
};

use crate::model::layers::UpsampleBlock;

/// Side length of the seed feature map the latent projection reshapes into.
pub const BASE_GRID: usize = 4;
/// Spatial resolution after the three doubling blocks (before `res_factor`).
pub const BASE_RES: usize = BASE_GRID * 8;

const SEED_CHANNELS: usize = 256;

/// Maps a latent noise vector to a synthetic face image in 0.0-1.0.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    latent_proj: Linear<B>,
    up_layer_1: UpsampleBlock<B>,
    up_layer_2: UpsampleBlock<B>,
    up_layer_3: UpsampleBlock<B>,
    refine_layer: Option<UpsampleBlock<B>>,
    out_layer: Conv2d<B>,
}

impl<B: Backend> Generator<B> {
    pub fn forward(&self, noise: Tensor<B, 2>) -> Tensor<B, 4> {
        let output = self.latent_proj.forward(noise);
        let output = output.reshape([
            -1,
            SEED_CHANNELS as i32,
            BASE_GRID as i32,
            BASE_GRID as i32,
        ]);

        let output = self.up_layer_1.forward(output);
        let output = self.up_layer_2.forward(output);
        let output = self.up_layer_3.forward(output);
        let output = match &self.refine_layer {
            Some(layer) => layer.forward(output),
            None => output,
        };

        let output = self.out_layer.forward(output);

        activation::sigmoid(output)
    }
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    /// Length of the noise vector.
    #[config(default = 100)]
    pub latent_dim: usize,
    /// Output image channels.
    #[config(default = 3)]
    pub channels: usize,
    /// Multiplier applied on top of the base 32px resolution.
    #[config(default = 4)]
    pub res_factor: usize,
}

impl GeneratorConfig {
    /// Side length of the generated images.
    pub fn image_res(&self) -> usize {
        BASE_RES * self.res_factor
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let latent_proj = LinearConfig::new(self.latent_dim, SEED_CHANNELS * BASE_GRID * BASE_GRID)
            .init(device);

        let up_layer_1 = UpsampleBlock::new([SEED_CHANNELS, 256], 2, device);
        let up_layer_2 = UpsampleBlock::new([256, 256], 2, device);
        let up_layer_3 = UpsampleBlock::new([256, 128], 2, device);
        // Extra non-doubling block to reach resolutions beyond the base grid.
        let refine_layer =
            (self.res_factor > 1).then(|| UpsampleBlock::new([128, 128], self.res_factor, device));

        let out_layer = Conv2dConfig::new([128, self.channels], [5, 5])
            .with_padding(PaddingConfig2d::Explicit(2, 2))
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: 0.02,
            })
            .init(device);

        Generator {
            latent_proj,
            up_layer_1,
            up_layer_2,
            up_layer_3,
            refine_layer,
            out_layer,
        }
    }
}
