//! ChilliBot Core
//!
//! Types shared between the vision pipeline and the LINE webhook server.
//!
//! This crate provides:
//! - The common error type and result alias
//! - [`ClassificationResult`], the single output shape of image classification
//! - [`ClassCatalog`], the static table from model class index to disease text

pub mod catalog;
pub mod error;
pub mod result;

pub use catalog::{ClassCatalog, ClassEntry, CHILLI_CATALOG, UNKNOWN_CLASS};
pub use error::{Error, Result};
pub use result::{ClassificationResult, ANALYSIS_FAILED, MODEL_UNAVAILABLE};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catalog::{ClassCatalog, ClassEntry, CHILLI_CATALOG};
    pub use crate::error::{Error, Result};
    pub use crate::result::ClassificationResult;
}
