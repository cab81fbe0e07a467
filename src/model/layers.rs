use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, LeakyRelu,
        LeakyReluConfig, PaddingConfig2d,
    },
    prelude::*,
};

fn conv_initializer() -> Initializer {
    Initializer::Normal {
        mean: 0.0,
        std: 0.02,
    }
}

/// Generator block: nearest-neighbour upsampling followed by a convolution.
#[derive(Module, Debug)]
pub struct UpsampleBlock<B: Backend> {
    upsample: Interpolate2d,
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    lrelu: LeakyRelu,
}

impl<B: Backend> UpsampleBlock<B> {
    pub fn new(channels: [usize; 2], scale: usize, device: &B::Device) -> Self {
        let upsample = Interpolate2dConfig::new()
            .with_scale_factor(Some([scale as f32, scale as f32]))
            .with_mode(InterpolateMode::Nearest)
            .init();
        let conv = Conv2dConfig::new(channels, [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_initializer(conv_initializer())
            .init(device);
        let bn = BatchNormConfig::new(channels[1])
            .with_momentum(0.99)
            .init(device);
        let lrelu = LeakyReluConfig::new().with_negative_slope(0.2).init();

        Self {
            upsample,
            conv,
            bn,
            lrelu,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.upsample.forward(input);
        let output = self.conv.forward(output);
        let output = self.bn.forward(output);
        self.lrelu.forward(output)
    }
}

/// Discriminator block: strided convolution with dropout regularization.
#[derive(Module, Debug)]
pub struct DiscBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    lrelu: LeakyRelu,
    dropout: Dropout,
}

impl<B: Backend> DiscBlock<B> {
    pub fn new(channels: [usize; 2], stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(channels, [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_stride([stride, stride])
            .with_initializer(conv_initializer())
            .init(device);
        let bn = BatchNormConfig::new(channels[1])
            .with_momentum(0.99)
            .init(device);
        let lrelu = LeakyReluConfig::new().with_negative_slope(0.2).init();
        let dropout = DropoutConfig::new(0.25).init();

        Self {
            conv,
            bn,
            lrelu,
            dropout,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.conv.forward(input);
        let output = self.bn.forward(output);
        let output = self.lrelu.forward(output);
        self.dropout.forward(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn upsample_block_doubles_spatial_dims() {
        let device = Default::default();
        let block = UpsampleBlock::<TestBackend>::new([8, 16], 2, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 8, 4, 4], &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn upsample_block_honours_scale_factor() {
        let device = Default::default();
        let block = UpsampleBlock::<TestBackend>::new([4, 4], 4, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 4, 4, 4], &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [2, 4, 16, 16]);
    }

    #[test]
    fn disc_block_halves_spatial_dims_with_stride_two() {
        let device = Default::default();
        let block = DiscBlock::<TestBackend>::new([8, 16], 2, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 8, 16, 16], &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn disc_block_preserves_spatial_dims_with_stride_one() {
        let device = Default::default();
        let block = DiscBlock::<TestBackend>::new([16, 32], 1, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 16, 8, 8], &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [1, 32, 8, 8]);
    }
}
