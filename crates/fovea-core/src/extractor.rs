/*!
The extractor wrapper: images in, named activation tensors out.

[`FeatureExtractor`] owns a [`Network`] handle and layers batch assembly,
preprocessing and conditional input reshaping on top of it. The network's
input shape is the only state mutated after construction.
*/

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use ndarray::{Array3, Array4, ArrayD, Axis};
use tracing::debug;

use crate::{
    engine::Network,
    error::{FoveaError, Result},
    image_io,
    transformer::{Transformer, TransformerConfig},
};

/// Adapts a raw network handle into a simple extraction interface.
///
/// When `target_dims` is set every incoming image is resized to it;
/// otherwise batches take their dimensions from the first image and the
/// network input is reshaped to follow.
///
/// Not internally synchronized: every network-touching call takes
/// `&mut self`, and cross-thread use needs an external mutex or one
/// extractor per thread, each with its own network handle.
pub struct FeatureExtractor<N: Network> {
    network: N,
    input_name: String,
    transformer: Transformer,
    target_dims: Option<(usize, usize)>,
    last_input: Option<Array4<f32>>,
}

impl<N: Network> FeatureExtractor<N> {
    /// Wrap `network`, deriving the expected input from its declared inputs
    /// and validating the preprocessing options against the input blob.
    pub fn new(
        network: N,
        target_dims: Option<(usize, usize)>,
        config: TransformerConfig,
    ) -> Result<Self> {
        let input_name = network
            .input_names()
            .first()
            .cloned()
            .ok_or_else(|| FoveaError::Config("network declares no inputs".to_owned()))?;

        let input_shape = network.blob_shape(&input_name)?;
        if input_shape.len() != 4 {
            return Err(FoveaError::Config(format!(
                "input blob {:?} has shape {:?}, expected batch-channel-height-width",
                input_name, input_shape
            )));
        }

        if let Some((height, width)) = target_dims {
            if height == 0 || width == 0 {
                return Err(FoveaError::Config(format!(
                    "target dimensions ({height}, {width}) must be non-zero"
                )));
            }
        }

        let transformer = Transformer::new(config, input_shape[1])?;

        Ok(Self {
            network,
            input_name,
            transformer,
            target_dims,
            last_input: None,
        })
    }

    /// The derived input blob name.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// The configured resize target, if any.
    pub fn target_dims(&self) -> Option<(usize, usize)> {
        self.target_dims
    }

    /// The wrapped network handle.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// A defensive copy of the tensor last fed to the network, for
    /// diagnostic de-preprocessing by the caller.
    pub fn current_input(&self) -> Option<Array4<f32>> {
        self.last_input.clone()
    }

    /// Assemble a batch tensor from HWC images and run the transform plan.
    ///
    /// Without configured target dimensions (and with `auto_reshape` on)
    /// the batch takes its spatial dimensions from the first image and
    /// every other image must match it exactly; otherwise each image is
    /// resized to the target. The network input shape is reconciled before
    /// the transform plan runs, so the engine's buffers are already sized
    /// for the batch by the time it is fed.
    pub fn preprocess(&mut self, images: &[Array3<f32>], auto_reshape: bool) -> Result<Array4<f32>> {
        if images.is_empty() {
            return Err(FoveaError::Config(
                "cannot preprocess an empty image batch".to_owned(),
            ));
        }

        let channels = self.transformer.channels();
        let native = self.target_dims.is_none() && auto_reshape;

        let (height, width) = if native {
            let (first_height, first_width, _) = images[0].dim();
            (first_height, first_width)
        } else {
            self.target_dims.ok_or_else(|| {
                FoveaError::Config(
                    "no target dimensions configured and auto-reshape is disabled".to_owned(),
                )
            })?
        };

        for (index, image) in images.iter().enumerate() {
            let (image_height, image_width, image_channels) = image.dim();
            let expected = if native {
                vec![height, width, channels]
            } else {
                // Resize fixes the spatial dimensions; only depth must agree.
                vec![image_height, image_width, channels]
            };

            if image_channels != channels || (native && (image_height, image_width) != (height, width))
            {
                return Err(FoveaError::ShapeMismatch {
                    index,
                    expected,
                    actual: vec![image_height, image_width, image_channels],
                });
            }
        }

        let (d0, d1, d2) = self.transformer.output_dims(height, width);
        let candidate = vec![images.len(), d0, d1, d2];

        if auto_reshape {
            self.reshape_if_needed(&candidate)?;
        }

        let mut batch = Array4::zeros((images.len(), d0, d1, d2));
        for (index, image) in images.iter().enumerate() {
            let staged;
            let view = if native {
                image.view()
            } else {
                staged = image_io::resize_image(image.view(), (height, width));
                staged.view()
            };

            batch
                .index_axis_mut(Axis(0), index)
                .assign(&self.transformer.apply(view));
        }

        self.last_input = Some(batch.clone());
        Ok(batch)
    }

    /// Reconcile the network's declared input shape with `candidate`.
    ///
    /// No-op when the shapes already match; otherwise mutates the input
    /// blob and runs one full shape propagation, which completes before
    /// any buffer is read.
    pub fn reshape_if_needed(&mut self, candidate: &[usize]) -> Result<()> {
        let current = self.network.blob_shape(&self.input_name)?;
        if current == candidate {
            return Ok(());
        }

        debug!(from = ?current, to = ?candidate, "reshaping network input");
        self.network.reshape_input(&self.input_name, candidate)?;
        self.network.propagate_shapes()
    }

    /// Preprocess and run one forward pass, returning all output blobs as
    /// produced by the engine.
    pub fn run(
        &mut self,
        images: &[Array3<f32>],
        auto_reshape: bool,
    ) -> Result<HashMap<String, ArrayD<f32>>> {
        let batch = self.preprocess(images, auto_reshape)?;
        self.network.forward(&self.input_name, &batch)
    }

    /// Run the network and return a defensive copy of each requested blob's
    /// post-forward data.
    ///
    /// `blob_names` must not contain duplicates; a name absent from the
    /// network's blob table fails the whole call, with no partial result.
    pub fn extract(
        &mut self,
        images: &[Array3<f32>],
        blob_names: &[&str],
        auto_reshape: bool,
    ) -> Result<HashMap<String, ArrayD<f32>>> {
        let mut seen = HashSet::new();
        for name in blob_names {
            if !seen.insert(*name) {
                return Err(FoveaError::DuplicateBlob((*name).to_owned()));
            }
        }

        // The forward pass runs even with zero names requested; it still
        // updates the blob table and the remembered input tensor.
        self.run(images, auto_reshape)?;

        let mut extracted = HashMap::with_capacity(blob_names.len());
        for name in blob_names {
            let data = self.network.blob_data(name)?;
            extracted.insert((*name).to_owned(), data);
        }

        Ok(extracted)
    }

    /// Decode image files and extract the requested blobs from them.
    pub fn extract_files<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        blob_names: &[&str],
        auto_reshape: bool,
    ) -> Result<HashMap<String, ArrayD<f32>>> {
        let images = paths
            .iter()
            .map(|path| image_io::load_image(path.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        self.extract(&images, blob_names, auto_reshape)
    }
}
