use burn::{
    module::Module,
    nn::{Linear, LinearConfig, Sigmoid},
    prelude::*,
};

use crate::model::layers::DiscBlock;

/// Scores an image batch with the probability that each image is real.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    disc_layer_1: DiscBlock<B>,
    disc_layer_2: DiscBlock<B>,
    disc_layer_3: DiscBlock<B>,
    disc_layer_4: DiscBlock<B>,
    disc_layer_5: DiscBlock<B>,
    out_layer: Linear<B>,
    sig: Sigmoid,
}

impl<B: Backend> Discriminator<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let output = self.disc_layer_1.forward(input);
        let output = self.disc_layer_2.forward(output);
        let output = self.disc_layer_3.forward(output);
        let output = self.disc_layer_4.forward(output);
        let output = self.disc_layer_5.forward(output);

        let output: Tensor<B, 2> = output.flatten(1, 3);
        let output = self.out_layer.forward(output);

        // Clamp so cross-entropy never sees exact 0 or 1.
        self.sig.forward(output).clamp(0.00001, 0.99999)
    }
}

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    /// Side length of the input images.
    pub image_res: usize,
    #[config(default = 3)]
    pub channels: usize,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        assert!(
            self.image_res % 8 == 0,
            "image resolution must be divisible by 8, got {}",
            self.image_res
        );

        let disc_layer_1 = DiscBlock::new([self.channels, 32], 2, device);
        let disc_layer_2 = DiscBlock::new([32, 64], 2, device);
        let disc_layer_3 = DiscBlock::new([64, 128], 2, device);
        let disc_layer_4 = DiscBlock::new([128, 256], 1, device);
        let disc_layer_5 = DiscBlock::new([256, 512], 1, device);

        // Three stride-2 blocks leave image_res/8 pixels per side.
        let pixels = self.image_res / 8;
        let out_layer = LinearConfig::new(512 * pixels * pixels, 1).init(device);
        let sig = Sigmoid::new();

        Discriminator {
            disc_layer_1,
            disc_layer_2,
            disc_layer_3,
            disc_layer_4,
            disc_layer_5,
            out_layer,
            sig,
        }
    }
}
