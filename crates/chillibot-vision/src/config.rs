//! Configuration for model provisioning and the image classifier

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the provisioner needs to turn a remote artifact into a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where the weights come from when they are not cached locally
    #[serde(default)]
    pub source: ModelSource,

    /// Local cache path for the weights file
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    /// Weights file format
    #[serde(default)]
    pub format: ModelFormat,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceType,

    /// Network layout the weights were trained for
    #[serde(default)]
    pub architecture: ArchitectureConfig,

    /// Upper bound for the whole remote download, in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

/// Source location for model weights
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSource {
    /// Only the local cache path is used; nothing is downloaded
    #[default]
    Local,

    /// Plain HTTP(S) download, following large-file confirmation pages
    Url { url: String },

    /// Download from Hugging Face Hub
    #[serde(rename = "huggingface")]
    HuggingFace {
        repo_id: String,
        filename: String,
        #[serde(default)]
        revision: Option<String>,
    },
}

impl ModelSource {
    /// Short description for logs and the status endpoint
    pub fn describe(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Url { url } => url.clone(),
            Self::HuggingFace {
                repo_id,
                filename,
                revision,
            } => format!(
                "hf://{}@{}/{}",
                repo_id,
                revision.as_deref().unwrap_or("main"),
                filename
            ),
        }
    }
}

/// Device type for inference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// CPU inference (always available)
    #[default]
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize),
    /// Metal (Apple Silicon)
    Metal(usize),
}

/// Model file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// SafeTensors format (recommended)
    #[default]
    SafeTensors,
    /// PyTorch format
    PyTorch,
}

/// Layout of the convolutional classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    /// Square input resolution in pixels
    #[serde(default = "default_input_size")]
    pub input_size: usize,

    /// Number of output classes
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Output channels of each conv block, in order
    #[serde(default = "default_conv_channels")]
    pub conv_channels: Vec<usize>,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            input_size: default_input_size(),
            num_classes: default_num_classes(),
            conv_channels: default_conv_channels(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            source: ModelSource::Local,
            local_path: default_local_path(),
            format: ModelFormat::SafeTensors,
            device: DeviceType::Cpu,
            architecture: ArchitectureConfig::default(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Use an already-present weights file
    pub fn from_local(path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: path.into(),
            ..Default::default()
        }
    }

    /// Download from a URL into `local_path` on first use
    pub fn from_url(url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            source: ModelSource::Url { url: url.into() },
            local_path: local_path.into(),
            ..Default::default()
        }
    }

    /// Download from Hugging Face into `local_path` on first use
    pub fn from_hf(
        repo_id: impl Into<String>,
        filename: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: ModelSource::HuggingFace {
                repo_id: repo_id.into(),
                filename: filename.into(),
                revision: None,
            },
            local_path: local_path.into(),
            ..Default::default()
        }
    }

    /// Set device
    pub fn with_device(mut self, device: DeviceType) -> Self {
        self.device = device;
        self
    }

    /// Set model format
    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = format;
        self
    }

    /// Set network layout
    pub fn with_architecture(mut self, architecture: ArchitectureConfig) -> Self {
        self.architecture = architecture;
        self
    }

    /// Set Hugging Face revision
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        if let ModelSource::HuggingFace {
            repo_id, filename, ..
        } = self.source
        {
            self.source = ModelSource::HuggingFace {
                repo_id,
                filename,
                revision: Some(revision.into()),
            };
        }
        self
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

fn default_local_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chillibot")
        .join("chilli_cnn.safetensors")
}

fn default_download_timeout_secs() -> u64 {
    600
}

fn default_input_size() -> usize {
    224
}

fn default_num_classes() -> usize {
    chillibot_core::CHILLI_CATALOG.len()
}

fn default_conv_channels() -> Vec<usize> {
    vec![16, 32, 64]
}
