//! Weights loading for Candle-based image models

use crate::config::{DeviceType, ModelConfig, ModelFormat};
use crate::model::{ChilliNet, ImageModel};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use chillibot_core::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Load the weights at `weights_path` into a ready-to-run [`ChilliNet`]
pub fn load_model(config: &ModelConfig, weights_path: &Path) -> Result<Arc<dyn ImageModel>> {
    let device = create_device(config.device)?;
    debug!(path = ?weights_path, format = ?config.format, "Loading model weights");

    let var_builder = var_builder(config.format, weights_path, &device)?;
    let model = ChilliNet::new(&config.architecture, var_builder).map_err(|e| {
        Error::provision(format!(
            "Weights in {:?} do not match the configured architecture: {}",
            weights_path, e
        ))
    })?;

    info!(
        path = ?weights_path,
        depth = model.depth(),
        input_size = config.architecture.input_size,
        num_classes = config.architecture.num_classes,
        "Model loaded"
    );
    Ok(Arc::new(model))
}

/// Read a weights file into a VarBuilder
fn var_builder(format: ModelFormat, path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    match format {
        ModelFormat::SafeTensors => {
            let tensors = candle_core::safetensors::load(path, device)
                .map_err(|e| Error::provision(format!("Failed to load SafeTensors: {}", e)))?;
            Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
        }
        ModelFormat::PyTorch => VarBuilder::from_pth(path, DType::F32, device)
            .map_err(|e| Error::provision(format!("Failed to load PyTorch weights: {}", e))),
    }
}

/// Create Candle device from device type
pub fn create_device(device_type: DeviceType) -> Result<Device> {
    match device_type {
        DeviceType::Cpu => Ok(Device::Cpu),
        DeviceType::Cuda(idx) => Device::new_cuda(idx)
            .map_err(|e| Error::provision(format!("Failed to create CUDA device: {}", e))),
        DeviceType::Metal(idx) => Device::new_metal(idx)
            .map_err(|e| Error::provision(format!("Failed to create Metal device: {}", e))),
    }
}
