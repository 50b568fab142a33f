use serde::{Deserialize, Serialize};

/// One client message: the image to analyze.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalysisRequest {
    pub image_path: String,
}

/// Successful analysis of a single head-CT image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisReport {
    pub prediction: String,
    pub confidence_level: String,
    pub hemorrhage_probability: f64,
    pub no_hemorrhage_probability: f64,
    /// Wall-clock inference time in milliseconds, two decimals.
    pub analysis_duration: f64,
    pub device: String,
    pub midline_shift: bool,
    /// Estimated midline displacement in millimeters, two decimals.
    pub shift_score: f64,
    pub midline_detail: String,
    pub ventricle_issue: bool,
    pub ventricle_detail: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorReply {
    pub error: String,
}

/// Exactly one response per request: either the full report or an error,
/// never both.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ResponseMessage {
    Report(Box<AnalysisReport>),
    Error(ErrorReply),
}

impl ResponseMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ResponseMessage::Error(ErrorReply {
            error: message.into(),
        })
    }
}
