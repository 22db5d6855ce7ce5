/*!
Turns configuration into a ready-to-use extractor.

The loader resolves model and weight paths against a configured root,
selects the compute device, and constructs a [`FeatureExtractor`] with the
engine family's fixed preprocessing defaults: HWC to CHW transpose,
reversed channel order and a raw pixel scale of 255.
*/

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    engine::{ComputeDevice, Engine, RunMode},
    error::Result,
    extractor::FeatureExtractor,
    transformer::TransformerConfig,
};

/// Process-wide loading configuration.
///
/// Explicit rather than global so multiple logical configurations can be
/// exercised independently within one process.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Root directory under which model and weight fragments are resolved.
    pub root: PathBuf,
    /// The compute device to select before loading.
    pub device: ComputeDevice,
}

/// Per-extractor overrides on top of the fixed preprocessing defaults.
#[derive(Debug, Clone, Default)]
pub struct ExtractorOptions {
    /// Resize target for incoming images; when unset, batches keep their
    /// native dimensions and the network is reshaped to follow.
    pub target_dims: Option<(usize, usize)>,
    /// Per-channel mean to subtract, in the network's channel order.
    pub mean: Option<Vec<f32>>,
    /// Final scalar multiplier after mean subtraction.
    pub input_scale: Option<f32>,
}

/// Construct an engine via `engine_factory`, select the configured device,
/// load the network at `config.root`-relative paths and wrap it.
///
/// The factory defers engine construction to this call since an engine may
/// be expensive to bring up. Device selection failures are fatal and
/// propagated unchanged. Returns the engine handle alongside the extractor
/// so the caller can load further networks from it.
pub fn load_extractor<E, F>(
    engine_factory: F,
    config: &LoadConfig,
    model_relpath: &Path,
    weights_relpath: &Path,
    options: ExtractorOptions,
) -> Result<(E, FeatureExtractor<E::Network>)>
where
    E: Engine,
    F: FnOnce() -> Result<E>,
{
    let engine = engine_factory()?;

    info!(device = %config.device, "selecting compute device");
    engine.set_device(config.device)?;

    let model_path = config.root.join(model_relpath);
    let weights_path = config.root.join(weights_relpath);

    info!(model = %model_path.display(), weights = %weights_path.display(), "loading network");
    let network = engine.load_network(&model_path, &weights_path, RunMode::Inference)?;

    let transformer = TransformerConfig {
        mean: options.mean,
        input_scale: options.input_scale,
        raw_scale: Some(255.0),
        channel_swap: Some(vec![2, 1, 0]),
        transpose: true,
    };

    let extractor = FeatureExtractor::new(network, options.target_dims, transformer)?;
    Ok((engine, extractor))
}
