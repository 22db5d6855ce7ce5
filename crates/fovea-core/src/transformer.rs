/*!
Preprocessing from raw image arrays to the layout a network expects.

The transform order is fixed by the engine family: layout transpose,
channel swap, raw-scale multiply, mean subtraction, input-scale multiply.
Options that are not supplied stay identity; nothing is defaulted to a
guessed value.
*/

use ndarray::{Array3, ArrayView3, Axis};

use crate::error::{FoveaError, Result};

/// Optional preprocessing parameters.
///
/// `transpose` converts height-width-channel input to channel-height-width
/// output; the remaining options are per-stage and identity when `None`.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// Per-channel offset subtracted after raw scaling. A single element
    /// applies to every channel.
    pub mean: Option<Vec<f32>>,
    /// Scalar multiplier applied last, after mean subtraction.
    pub input_scale: Option<f32>,
    /// Scalar multiplier applied before mean subtraction, typically 255 for
    /// networks trained on raw pixel values.
    pub raw_scale: Option<f32>,
    /// Permutation of channel indices, e.g. `[2, 1, 0]` for RGB to BGR.
    pub channel_swap: Option<Vec<usize>>,
    /// Transpose from HWC to CHW layout.
    pub transpose: bool,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            mean: None,
            input_scale: None,
            raw_scale: None,
            channel_swap: None,
            transpose: true,
        }
    }
}

/// A transform plan validated against a fixed channel count.
#[derive(Debug, Clone)]
pub struct Transformer {
    config: TransformerConfig,
    channels: usize,
}

impl Transformer {
    /// Validate `config` against the network input's channel count.
    pub fn new(config: TransformerConfig, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(FoveaError::Config(
                "network input has zero channels".to_owned(),
            ));
        }

        if let Some(mean) = &config.mean {
            if mean.len() != channels && mean.len() != 1 {
                return Err(FoveaError::Config(format!(
                    "mean has {} elements but the input has {} channels",
                    mean.len(),
                    channels
                )));
            }
        }

        if let Some(swap) = &config.channel_swap {
            let mut seen = vec![false; channels];
            let valid = swap.len() == channels
                && swap.iter().all(|&src| {
                    if src >= channels || seen[src] {
                        false
                    } else {
                        seen[src] = true;
                        true
                    }
                });
            if !valid {
                return Err(FoveaError::Config(format!(
                    "channel swap {:?} is not a permutation of 0..{}",
                    swap, channels
                )));
            }
        }

        Ok(Self { config, channels })
    }

    /// The channel count this plan was validated against.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The per-image output dimensions for a `(height, width)` source.
    pub fn output_dims(&self, height: usize, width: usize) -> (usize, usize, usize) {
        if self.config.transpose {
            (self.channels, height, width)
        } else {
            (height, width, self.channels)
        }
    }

    /// Run the plan over one HWC image.
    pub fn apply(&self, image: ArrayView3<'_, f32>) -> Array3<f32> {
        let channel_axis = if self.config.transpose { Axis(0) } else { Axis(2) };

        let mut data = if self.config.transpose {
            image.permuted_axes([2, 0, 1]).to_owned()
        } else {
            image.to_owned()
        };

        if let Some(swap) = &self.config.channel_swap {
            let mut swapped = Array3::zeros(data.raw_dim());
            for (dst, &src) in swap.iter().enumerate() {
                swapped
                    .index_axis_mut(channel_axis, dst)
                    .assign(&data.index_axis(channel_axis, src));
            }
            data = swapped;
        }

        if let Some(scale) = self.config.raw_scale {
            data.mapv_inplace(|v| v * scale);
        }

        if let Some(mean) = &self.config.mean {
            if mean.len() == 1 {
                data.mapv_inplace(|v| v - mean[0]);
            } else {
                for (channel, &offset) in mean.iter().enumerate() {
                    data.index_axis_mut(channel_axis, channel)
                        .mapv_inplace(|v| v - offset);
                }
            }
        }

        if let Some(scale) = self.config.input_scale {
            data.mapv_inplace(|v| v * scale);
        }

        data
    }
}
