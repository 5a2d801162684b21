//! Image model trait and the convolutional chilli classifier

use crate::config::ArchitectureConfig;
use candle_core::{Device, Tensor, D};
use candle_nn::{Conv2d, Conv2dConfig, Linear, Module, VarBuilder};

/// A loaded image classifier that can run one forward pass
///
/// Implementations are shared read-only across requests, so `forward` must
/// not mutate any state.
pub trait ImageModel: Send + Sync {
    /// Square input resolution in pixels
    fn input_size(&self) -> usize;

    /// Device input tensors must live on
    fn device(&self) -> &Device;

    /// Map a `[1, 3, H, W]` batch with values in `[0, 1]` to a
    /// `[1, num_classes]` probability distribution
    fn forward(&self, batch: &Tensor) -> candle_core::Result<Tensor>;
}

/// Stacked conv3x3/ReLU/maxpool blocks, global average pooling and a
/// softmax classification head
///
/// Tensor names follow `features.{i}.weight|bias` and
/// `classifier.weight|bias`.
pub struct ChilliNet {
    features: Vec<Conv2d>,
    classifier: Linear,
    input_size: usize,
    device: Device,
}

impl ChilliNet {
    /// Build the network from weights in `vb`
    pub fn new(arch: &ArchitectureConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let mut features = Vec::with_capacity(arch.conv_channels.len());
        let mut in_channels = 3;
        for (idx, &out_channels) in arch.conv_channels.iter().enumerate() {
            features.push(candle_nn::conv2d(
                in_channels,
                out_channels,
                3,
                conv_cfg,
                vb.pp(format!("features.{idx}")),
            )?);
            in_channels = out_channels;
        }

        let classifier = candle_nn::linear(in_channels, arch.num_classes, vb.pp("classifier"))?;

        Ok(Self {
            features,
            classifier,
            input_size: arch.input_size,
            device: vb.device().clone(),
        })
    }

    /// Number of conv blocks
    pub fn depth(&self) -> usize {
        self.features.len()
    }
}

impl ImageModel for ChilliNet {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, batch: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = batch.clone();
        for conv in &self.features {
            xs = conv.forward(&xs)?.relu()?.max_pool2d(2)?;
        }
        // [N, C, H, W] -> [N, C]
        let pooled = xs.flatten_from(2)?.mean(D::Minus1)?;
        let logits = self.classifier.forward(&pooled)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }
}
