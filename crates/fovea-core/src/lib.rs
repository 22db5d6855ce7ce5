/*!

# Fovea Core

A thin convenience layer for pulling named activation tensors out of a
neural network: load a trained model, preprocess raw images into the
tensor layout the model expects, run a forward pass and copy out the
blobs you asked for by name.

All heavy computation is delegated to an inference engine reached through
the narrow [`engine::Engine`] / [`engine::Network`] traits; this crate
only does configuration plumbing, batch assembly and reshape-on-demand.
See the `fovea-tract` crate for a concrete backend.

The flow is loader first: [`loader::load_extractor`] builds the engine,
selects the compute device, resolves model and weight paths against a
configured root and returns a [`extractor::FeatureExtractor`]. From there
`extract` (or `extract_files`) preprocesses a batch, runs one forward pass
and hands back a map from blob name to a defensive copy of its data.
 */

#![warn(rust_2018_idioms)]

pub mod engine;
pub mod error;
pub mod extractor;
pub mod image_io;
pub mod loader;
pub mod transformer;

/// Most core types are re-exported here.
pub mod prelude {
    pub use super::engine::{ComputeDevice, Engine, Network, RunMode};
    pub use super::error::FoveaError;
    pub use super::extractor::FeatureExtractor;
    pub use super::loader::{load_extractor, ExtractorOptions, LoadConfig};
    pub use super::transformer::{Transformer, TransformerConfig};
}
