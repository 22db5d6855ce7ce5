/*!
Backs the fovea engine interface with ONNX models executed by tract.

Tract has no mutable blob table; instead the untyped model is kept around
and every input reshape re-facts it and rebuilds the optimized execution
plan. That rebuild is the shape-propagation pass, and it completes before
any blob can be read, so propagation-before-read holds structurally.

Device selection is CPU-only: asking for a GPU fails loading outright.
*/

#![warn(rust_2018_idioms)]

use std::{
    collections::HashMap,
    ffi::OsStr,
    path::Path,
};

use anyhow::anyhow;
use fovea_core::{
    engine::{ComputeDevice, Engine, Network, RunMode},
    error::{FoveaError, Result},
};
use ndarray::{Array4, ArrayD, IxDyn};
use tract_onnx::{prelude::*, tract_hir::infer::Factoid};
use tracing::debug;

pub use tract_onnx;

/// Utility function to check whether a file name looks like an ONNX model.
pub fn is_onnx(path: &Path) -> bool {
    path.extension().and_then(OsStr::to_str) == Some("onnx")
}

/// An [`Engine`] loading ONNX models into tract execution plans.
#[derive(Default)]
pub struct TractEngine {
    keep_blobs: Vec<String>,
}

impl TractEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also expose the named intermediate activations as model outputs, so
    /// they appear in the blob table of every network this engine loads.
    ///
    /// Tract prunes everything not reachable from an output, so blobs to
    /// extract must be declared up front rather than discovered after a
    /// forward pass.
    pub fn with_kept_blobs<S: Into<String>>(blobs: impl IntoIterator<Item = S>) -> Self {
        Self {
            keep_blobs: blobs.into_iter().map(Into::into).collect(),
        }
    }
}

impl Engine for TractEngine {
    type Network = TractNetwork;

    fn load_network(&self, model: &Path, weights: &Path, mode: RunMode) -> Result<TractNetwork> {
        let RunMode::Inference = mode;

        // ONNX bundles topology and weights in one file; a distinct weights
        // path would be silently ignored, which is worse than refusing it.
        if !weights.as_os_str().is_empty() && weights != model {
            return Err(FoveaError::Config(format!(
                "ONNX models carry their weights; pass an empty weights path or repeat {:?}, got {:?}",
                model, weights
            )));
        }

        let mut inference = tract_onnx::onnx().model_for_path(model)?;

        if !self.keep_blobs.is_empty() {
            let mut names = output_names(&inference)?;
            names.extend(self.keep_blobs.iter().cloned());
            inference.set_output_names(&names)?;
        }

        TractNetwork::from_inference_model(inference)
    }

    fn set_device(&self, device: ComputeDevice) -> Result<()> {
        match device {
            ComputeDevice::Cpu => {
                debug!("selected cpu execution");
                Ok(())
            }
            ComputeDevice::Gpu(index) => Err(FoveaError::DeviceUnavailable(format!(
                "tract executes on the CPU only, cannot select gpu:{index}"
            ))),
        }
    }
}

/// A loaded network: the untyped model for reshaping, the optimized plan
/// for running, and the blob values cached from the last forward pass.
pub struct TractNetwork {
    model: InferenceModel,
    plan: TypedSimplePlan<TypedModel>,
    input_names: Vec<String>,
    output_names: Vec<String>,
    input_shape: Vec<usize>,
    output_shapes: HashMap<String, Vec<usize>>,
    blobs: HashMap<String, ArrayD<f32>>,
}

impl TractNetwork {
    fn from_inference_model(model: InferenceModel) -> Result<Self> {
        let input_names = input_names(&model)?;
        if input_names.is_empty() {
            return Err(FoveaError::Config(
                "model declares no inputs".to_owned(),
            ));
        }

        let output_names = output_names(&model)?;
        let input_shape = declared_input_shape(&model)?;

        let plan = build_plan(&model, &input_shape)?;
        let output_shapes = plan_output_shapes(&plan, &output_names)?;

        Ok(Self {
            model,
            plan,
            input_names,
            output_names,
            input_shape,
            output_shapes,
            blobs: HashMap::new(),
        })
    }
}

impl Network for TractNetwork {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn blob_shape(&self, name: &str) -> Result<Vec<usize>> {
        if self.input_names.iter().any(|n| n == name) {
            return Ok(self.input_shape.clone());
        }

        self.output_shapes
            .get(name)
            .cloned()
            .ok_or_else(|| FoveaError::MissingBlob(name.to_owned()))
    }

    fn blob_data(&self, name: &str) -> Result<ArrayD<f32>> {
        if let Some(data) = self.blobs.get(name) {
            return Ok(data.clone());
        }

        // Known blob that hasn't been written yet reads as zeroes.
        let shape = self.blob_shape(name)?;
        Ok(ArrayD::zeros(IxDyn(&shape)))
    }

    fn reshape_input(&mut self, name: &str, shape: &[usize]) -> Result<()> {
        if !self.input_names.iter().any(|n| n == name) {
            return Err(FoveaError::MissingBlob(name.to_owned()));
        }

        self.input_shape = shape.to_vec();
        Ok(())
    }

    fn propagate_shapes(&mut self) -> Result<()> {
        debug!(shape = ?self.input_shape, "rebuilding plan for new input shape");
        self.plan = build_plan(&self.model, &self.input_shape)?;
        self.output_shapes = plan_output_shapes(&self.plan, &self.output_names)?;
        // Stale activations would carry pre-reshape dimensions.
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
                "input tensor shape {:?} does not match the configured input shape {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let data = input
            .as_slice()
            .ok_or_else(|| FoveaError::Engine(anyhow!("input tensor is not contiguous")))?;
        let tensor = Tensor::from_shape(input.shape(), data)?;

        let results = self.plan.run(tvec!(tensor.into()))?;

        self.blobs
            .insert(input_name.to_owned(), input.clone().into_dyn());

        let mut produced = HashMap::with_capacity(self.output_names.len());
        for (index, name) in self.output_names.iter().enumerate() {
            let value = &results[index];
            let slice = value.as_slice::<f32>()?;
            let array = ArrayD::from_shape_vec(IxDyn(value.shape()), slice.to_vec())
                .map_err(|e| FoveaError::Engine(e.into()))?;

            self.blobs.insert(name.clone(), array.clone());
            produced.insert(name.clone(), array);
        }

        Ok(produced)
    }
}

fn input_names(model: &InferenceModel) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for outlet in model.input_outlets()? {
        let node = model.node(outlet.node);
        names.push(clean_name(&node.name));
    }

    Ok(names)
}

fn output_names(model: &InferenceModel) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for outlet in model.output_outlets()? {
        let name = model
            .outlet_labels
            .get(outlet)
            .cloned()
            .unwrap_or_else(|| model.node(outlet.node).name.clone());
        names.push(clean_name(&name));
    }

    Ok(names)
}

fn clean_name(name: &str) -> String {
    name.split(':').next().unwrap_or(name).to_owned()
}

/// The input shape the model declares. Symbolic dimensions (typically the
/// batch) concretize to 1; reshaping overrides them anyway.
fn declared_input_shape(model: &InferenceModel) -> Result<Vec<usize>> {
    let fact = model.input_fact(0)?;
    let shape = fact
        .shape
        .dims()
        .map(|dim| {
            dim.concretize()
                .and_then(|d| d.to_i64().ok())
                .map(|d| d as usize)
                .unwrap_or(1)
        })
        .collect();

    Ok(shape)
}

/// Concretize the input fact and rebuild the optimized runnable plan.
/// This runs tract's full shape inference over every node.
fn build_plan(model: &InferenceModel, input_shape: &[usize]) -> Result<TypedSimplePlan<TypedModel>> {
    let mut model = model.clone();

    for output in 0..model.output_outlets()?.len() {
        model.set_output_fact(output, Default::default())?;
    }

    let dims: TVec<TDim> = input_shape.iter().map(|&d| (d as i64).into()).collect();
    model.set_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), dims))?;

    let plan = model
        .into_typed()?
        .into_decluttered()?
        .into_optimized()?
        .into_runnable()?;

    Ok(plan)
}

fn plan_output_shapes(
    plan: &TypedSimplePlan<TypedModel>,
    output_names: &[String],
) -> Result<HashMap<String, Vec<usize>>> {
    let model = plan.model();
    let mut shapes = HashMap::with_capacity(output_names.len());

    for (index, name) in output_names.iter().enumerate() {
        let fact = model.output_fact(index)?;
        let shape = fact
            .shape
            .as_concrete()
            .ok_or_else(|| {
                FoveaError::Engine(anyhow!(
                    "output {:?} has a non-concrete shape after propagation",
                    name
                ))
            })?
            .to_vec();

        shapes.insert(name.clone(), shape);
    }

    Ok(shapes)
}
