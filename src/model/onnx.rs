//! ONNX Runtime inference. Input: [1, 9] f32, output: class-1 probability.
//! The runtime library is loaded dynamically (`ORT_DYLIB_PATH`) the first time a model is opened.
//! `ort` panics when that library is missing; loading turns both cases into `ModelError`.

use super::ModelError;
use crate::features::{FeatureVector, FEATURE_COUNT};
use ndarray::{Array2, CowArray};
use ort::{Environment, GraphOptimizationLevel, OrtError, Session, SessionBuilder, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, OnceLock};

static ORT_ENV: OnceLock<Arc<Environment>> = OnceLock::new();

fn environment() -> Result<Arc<Environment>, OrtError> {
    if let Some(env) = ORT_ENV.get() {
        return Ok(env.clone());
    }
    let env = Environment::builder()
        .with_name("fraudguard")
        .build()?
        .into_arc();
    Ok(ORT_ENV.get_or_init(|| env).clone())
}

pub struct OnnxScorer {
    session: Session,
}

/// An explicit `ORT_DYLIB_PATH` must name an existing file before `ort` is touched.
pub(crate) fn check_runtime_library() -> Result<(), ModelError> {
    match std::env::var_os("ORT_DYLIB_PATH") {
        Some(lib) if !Path::new(&lib).is_file() => Err(ModelError::RuntimeUnavailable(format!(
            "{} does not exist",
            Path::new(&lib).display()
        ))),
        _ => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "ONNX Runtime could not be initialised".to_string())
}

impl OnnxScorer {
    pub fn load(path: &Path, threads: i16) -> Result<Self, ModelError> {
        check_runtime_library()?;
        panic::catch_unwind(AssertUnwindSafe(|| Self::open(path, threads)))
            .unwrap_or_else(|payload| Err(ModelError::RuntimeUnavailable(panic_message(payload.as_ref()))))
    }

    fn open(path: &Path, threads: i16) -> Result<Self, ModelError> {
        let env = environment()?;
        let session = SessionBuilder::new(&env)?
            .with_optimization_level(GraphOptimizationLevel::Level1)?
            .with_intra_threads(threads.max(1))?
            .with_model_from_file(path)?;
        Ok(Self { session })
    }

    pub fn input_name(&self) -> Option<&str> {
        self.session.inputs.first().map(|i| i.name.as_str())
    }

    /// Classifier exports put the label first and probabilities last, so outputs are searched
    /// from the back for the first float tensor.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let arr = Array2::from_shape_vec((1, FEATURE_COUNT), features.to_f32().to_vec())?;
        let input = CowArray::from(arr.into_dyn());
        let value = Value::from_array(self.session.allocator(), &input)?;
        let outputs = self.session.run(vec![value])?;

        for out in outputs.iter().rev() {
            let Ok(tensor) = out.try_extract::<f32>() else {
                continue;
            };
            let flat: Vec<f32> = tensor.view().iter().copied().collect();
            let score = match flat.as_slice() {
                [] => continue,
                [p] => *p,
                [_, p, ..] => *p,
            };
            return Ok(score as f64);
        }
        Err(ModelError::NoOutput)
    }
}
