/*!
The capability surface required from an inference engine.

All heavy computation lives behind these traits; this crate only does
shape negotiation and preprocessing on top of them. A backend (see the
`fovea-tract` crate) implements [`Engine`] and hands out [`Network`]
handles; tests use a scripted stand-in.
*/

use std::{collections::HashMap, path::Path};

use ndarray::{Array4, ArrayD};

use crate::error::Result;

/// The compute device a network executes on.
///
/// Device selection is process-wide engine state, not per-network: two
/// engines targeting different devices in the same process are unsupported
/// by the underlying execution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    /// A specific GPU, by device index.
    Gpu(usize),
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeDevice::Cpu => f.pad("cpu"),
            ComputeDevice::Gpu(idx) => write!(f, "gpu:{idx}"),
        }
    }
}

/// How a network is instantiated.
///
/// Only inference is meaningful here; the enum exists so a
/// training-capable engine can refuse anything else explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Inference,
}

/// A loaded network: named blobs, a mutable input shape, and a forward pass.
///
/// Every method that touches engine state takes `&mut self`; the handle is
/// not internally synchronized and concurrent use requires external
/// serialization or one handle per thread.
pub trait Network {
    /// The network's declared input blob names, in declaration order.
    fn input_names(&self) -> &[String];

    /// The current shape of the named blob.
    fn blob_shape(&self, name: &str) -> Result<Vec<usize>>;

    /// A defensive copy of the named blob's current contents.
    ///
    /// The underlying buffer is rewritten by the next forward pass, so
    /// implementations must copy rather than alias.
    fn blob_data(&self, name: &str) -> Result<ArrayD<f32>>;

    /// Mutate the declared shape of the named input blob.
    ///
    /// Side-effecting with no result; the new shape takes effect for the
    /// rest of the network only after [`Network::propagate_shapes`].
    fn reshape_input(&mut self, name: &str, shape: &[usize]) -> Result<()>;

    /// Recompute every layer's buffer dimensions from the current input
    /// shape. Must complete before any blob is read.
    fn propagate_shapes(&mut self) -> Result<()>;

    /// One full forward pass over the given named input tensor, returning
    /// all output blobs as the engine produced them.
    fn forward(
        &mut self,
        input_name: &str,
        input: &Array4<f32>,
    ) -> Result<HashMap<String, ArrayD<f32>>>;
}

/// An inference engine capable of loading networks and selecting a device.
pub trait Engine {
    type Network: Network;

    /// Load a network from a model definition and trained weights.
    fn load_network(&self, model: &Path, weights: &Path, mode: RunMode) -> Result<Self::Network>;

    /// Select the process-wide compute device.
    ///
    /// Fails with [`crate::FoveaError::DeviceUnavailable`] if the device
    /// cannot be selected; callers treat that as fatal.
    fn set_device(&self, device: ComputeDevice) -> Result<()>;
}
