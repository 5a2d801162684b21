//! ChilliBot Vision
//!
//! Chilli disease detection from photos.
//!
//! Two pieces, in dependency order:
//! - [`ModelProvisioner`] makes sure the weights file is on local disk,
//!   downloading it once if needed, and loads it into a [`ModelHandle`].
//!   Failures degrade to a not-ready handle rather than an error.
//! - [`classify`] turns one image file into one [`ClassificationResult`],
//!   always returning a well-formed result.
//!
//! Inference runs on CPU by default through Candle.

pub mod config;
pub mod fetch;
pub mod inference;
pub mod model;
pub mod model_loader;
pub mod preprocess;
pub mod provisioner;

pub use chillibot_core::{ClassCatalog, ClassificationResult, CHILLI_CATALOG};
pub use config::{ArchitectureConfig, DeviceType, ModelConfig, ModelFormat, ModelSource};
pub use fetch::UrlGuard;
pub use inference::{classify, classify_blocking, classify_with_catalog};
pub use model::{ChilliNet, ImageModel};
pub use provisioner::{ModelHandle, ModelProvisioner};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{ModelConfig, ModelSource};
    pub use crate::inference::classify;
    pub use crate::model::ImageModel;
    pub use crate::provisioner::{ModelHandle, ModelProvisioner};
    pub use chillibot_core::ClassificationResult;
}
