use std::sync::{Arc, Mutex};

use tch::{CModule, Device, IValue, Kind, Tensor};

use crate::error::PipelineError;
use crate::preprocess;

/// Class-index convention shared by all three task heads:
/// index 0 = normal, index 1 = abnormal. Pinned here rather than inferred
/// per deployment; training-time label construction uses the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskClass {
    Normal,
    Abnormal,
}

/// One binary task head, softmaxed: a probability pair and its arg-max.
#[derive(Debug, Clone, Copy)]
pub struct TaskPrediction {
    pub normal_prob: f64,
    pub abnormal_prob: f64,
    pub decision: TaskClass,
}

impl TaskPrediction {
    /// Arg-max with ties resolved to the lower index (normal); the numeric
    /// layer does not guarantee strict inequality between the two scores.
    pub fn from_pair(normal_prob: f64, abnormal_prob: f64) -> Self {
        let decision = if abnormal_prob > normal_prob {
            TaskClass::Abnormal
        } else {
            TaskClass::Normal
        };
        Self {
            normal_prob,
            abnormal_prob,
            decision,
        }
    }

    pub fn is_abnormal(&self) -> bool {
        self.decision == TaskClass::Abnormal
    }

    /// Max of the two class probabilities, as a percentage.
    pub fn confidence_pct(&self) -> f64 {
        self.normal_prob.max(self.abnormal_prob) * 100.0
    }
}

/// Output of one full forward pass through the multi-head classifier.
#[derive(Debug, Clone, Copy)]
pub struct HeadOutputs {
    pub hemorrhage: TaskPrediction,
    pub midline: TaskPrediction,
    pub ventricle: TaskPrediction,
}

/// Seam between the session pipeline and the neural model, so the
/// protocol and fusion layers can be exercised without a weights file.
pub trait HeadClassifier: Send + Sync {
    /// Human-facing identifier of the device the model runs on.
    fn device_label(&self) -> String;

    /// Full neural pass for one image: preprocess, forward, softmax.
    fn run(&self, image_path: &str) -> Result<HeadOutputs, PipelineError>;
}

/// TorchScript multi-head classifier, loaded once and frozen.
pub struct TorchClassifier {
    module: Arc<Mutex<CModule>>,
    device: Device,
}

impl TorchClassifier {
    pub fn load(model_path: &str, device: Device) -> Result<Self, PipelineError> {
        let mut module = CModule::load_on_device(model_path, device)?;
        module.set_eval();
        Ok(Self {
            module: Arc::new(Mutex::new(module)),
            device,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, input: &Tensor) -> Result<HeadOutputs, PipelineError> {
        let output = tch::no_grad(|| {
            self.module
                .lock()
                .unwrap()
                .forward_is(&[IValue::Tensor(input.shallow_clone())])
        })?;
        let [hemorrhage, midline, ventricle]: [IValue; 3] = match output {
            IValue::Tuple(heads) => heads.try_into().map_err(|heads: Vec<IValue>| {
                PipelineError::Output(format!("expected 3 task heads, got {}", heads.len()))
            })?,
            other => {
                return Err(PipelineError::Output(format!(
                    "expected a tuple of task heads, got {:?}",
                    other
                )));
            }
        };
        Ok(HeadOutputs {
            hemorrhage: head_prediction(hemorrhage)?,
            midline: head_prediction(midline)?,
            ventricle: head_prediction(ventricle)?,
        })
    }
}

impl HeadClassifier for TorchClassifier {
    fn device_label(&self) -> String {
        match self.device {
            Device::Cuda(index) => format!("cuda:{}", index),
            _ => "cpu".to_string(),
        }
    }

    fn run(&self, image_path: &str) -> Result<HeadOutputs, PipelineError> {
        let input = preprocess::tensor_from_path(image_path, self.device)?;
        self.forward(&input)
    }
}

fn head_prediction(head: IValue) -> Result<TaskPrediction, PipelineError> {
    let logits = match head {
        IValue::Tensor(t) => t,
        other => {
            return Err(PipelineError::Output(format!(
                "expected a tensor head, got {:?}",
                other
            )));
        }
    };
    let probs = logits.softmax(-1, Kind::Float);
    let normal = probs.double_value(&[0, 0]);
    let abnormal = probs.double_value(&[0, 1]);
    Ok(TaskPrediction::from_pair(normal, abnormal))
}
