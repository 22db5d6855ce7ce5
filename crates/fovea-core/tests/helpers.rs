#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use fovea_core::{
    engine::{ComputeDevice, Engine, Network, RunMode},
    error::{FoveaError, Result},
};
use ndarray::{Array3, Array4, ArrayD, IxDyn};

/// A scripted network standing in for the opaque engine handle.
///
/// Forward passes fill every output blob with `1000 * pass_index + slot`
/// so tests can tell passes (and defensive copies) apart. Reshape and
/// propagation calls are counted.
pub struct MockNetwork {
    input_names: Vec<String>,
    input_shape: Vec<usize>,
    /// Output blob shapes, sans batch dimension.
    outputs: Vec<(String, Vec<usize>)>,
    blobs: HashMap<String, ArrayD<f32>>,
    pub reshape_calls: usize,
    pub propagations: usize,
    pub forwards: usize,
    pub last_forward_input: Option<Array4<f32>>,
}

impl MockNetwork {
    pub fn new(input_shape: Vec<usize>, outputs: Vec<(String, Vec<usize>)>) -> Self {
        Self {
            input_names: vec!["data".to_owned()],
            input_shape,
            outputs,
            blobs: HashMap::new(),
            reshape_calls: 0,
            propagations: 0,
            forwards: 0,
            last_forward_input: None,
        }
    }

    /// A net shaped like the classic classification deploy: one `data`
    /// input of (1, 3, 224, 224), `fc7` and `prob` outputs.
    pub fn classifier() -> Self {
        Self::new(
            vec![1, 3, 224, 224],
            vec![
                ("fc7".to_owned(), vec![4096]),
                ("prob".to_owned(), vec![1000]),
            ],
        )
    }

    /// An input-less network, for the constructor precondition.
    pub fn headless() -> Self {
        let mut net = Self::classifier();
        net.input_names.clear();
        net
    }

    fn output_shape(&self, name: &str) -> Option<Vec<usize>> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, dims)| {
            let mut shape = vec![self.input_shape[0]];
            shape.extend_from_slice(dims);
            shape
        })
    }
}

impl Network for MockNetwork {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn blob_shape(&self, name: &str) -> Result<Vec<usize>> {
        if self.input_names.iter().any(|n| n == name) {
            return Ok(self.input_shape.clone());
        }

        self.output_shape(name)
            .ok_or_else(|| FoveaError::MissingBlob(name.to_owned()))
    }

    fn blob_data(&self, name: &str) -> Result<ArrayD<f32>> {
        if let Some(data) = self.blobs.get(name) {
            return Ok(data.clone());
        }

        // Unwritten blobs read as zero-filled buffers of their shape.
        let shape = self.blob_shape(name)?;
        Ok(ArrayD::zeros(IxDyn(&shape)))
    }

    fn reshape_input(&mut self, name: &str, shape: &[usize]) -> Result<()> {
        if !self.input_names.iter().any(|n| n == name) {
            return Err(FoveaError::MissingBlob(name.to_owned()));
        }

        self.reshape_calls += 1;
        self.input_shape = shape.to_vec();
        Ok(())
    }

    fn propagate_shapes(&mut self) -> Result<()> {
        self.propagations += 1;
        self.blobs.clear();
        Ok(())
    }

    fn forward(
        &mut self,
        input_name: &str,
        input: &Array4<f32>,
    ) -> Result<HashMap<String, ArrayD<f32>>> {
        if input.shape() != self.input_shape.as_slice() {
            return Err(FoveaError::Engine(anyhow!(
                "forward input shape {:?} does not match configured {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        self.forwards += 1;
        self.last_forward_input = Some(input.clone());
        self.blobs
            .insert(input_name.to_owned(), input.clone().into_dyn());

        let mut produced = HashMap::new();
        let outputs = self.outputs.clone();
        for (slot, (name, _)) in outputs.iter().enumerate() {
            let shape = self.output_shape(name).unwrap();
            let fill = (self.forwards * 1000 + slot) as f32;
            let data = ArrayD::from_elem(IxDyn(&shape), fill);
            self.blobs.insert(name.clone(), data.clone());
            produced.insert(name.clone(), data);
        }

        Ok(produced)
    }
}

/// Engine factory companion for [`MockNetwork`]. Remembers the device it
/// was asked for via interior mutability so loader tests can observe it.
pub struct MockEngine {
    pub gpu_available: bool,
    pub selected: std::cell::Cell<Option<ComputeDevice>>,
    pub network: fn() -> MockNetwork,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            gpu_available: true,
            selected: std::cell::Cell::new(None),
            network: MockNetwork::classifier,
        }
    }

    pub fn cpu_only() -> Self {
        Self {
            gpu_available: false,
            ..Self::new()
        }
    }
}

impl Engine for MockEngine {
    type Network = MockNetwork;

    fn load_network(&self, model: &Path, _weights: &Path, _mode: RunMode) -> Result<MockNetwork> {
        if model.as_os_str().is_empty() {
            return Err(FoveaError::Config("empty model path".to_owned()));
        }

        Ok((self.network)())
    }

    fn set_device(&self, device: ComputeDevice) -> Result<()> {
        if matches!(device, ComputeDevice::Gpu(_)) && !self.gpu_available {
            return Err(FoveaError::DeviceUnavailable(format!(
                "no such device: {device}"
            )));
        }

        self.selected.set(Some(device));
        Ok(())
    }
}

/// An HWC image with constant per-channel values.
pub fn flat_image(height: usize, width: usize, values: [f32; 3]) -> Array3<f32> {
    let mut image = Array3::zeros((height, width, 3));
    for (channel, &value) in values.iter().enumerate() {
        image
            .index_axis_mut(ndarray::Axis(2), channel)
            .fill(value);
    }
    image
}

/// Write a solid-color PNG for file-based extraction tests.
pub fn write_test_png(dir: &Path, name: &str, rgb: [u8; 3], size: (u32, u32)) -> PathBuf {
    let (width, height) = size;
    let image = image_buffer(width, height, rgb);
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

fn image_buffer(width: u32, height: u32, rgb: [u8; 3]) -> image::RgbImage {
    image::RgbImage::from_pixel(width, height, image::Rgb(rgb))
}
