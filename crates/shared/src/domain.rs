use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DEPARTMENT: &str = "default";
pub const DEFAULT_DOCTOR: &str = "default";
pub const DEFAULT_DOCUMENT_TYPE: &str = "他院への紹介";
pub const DEFAULT_MODEL: &str = "Claude";

/// Output tabs in display order. Index 0 is the full document, the rest name
/// sections of the parsed summary.
pub const TAB_LABELS: [&str; 8] = [
    "全文",
    "主病名",
    "紹介目的",
    "既往歴",
    "症状経過",
    "治療経過",
    "現在の処方",
    "備考",
];

pub const FULL_TEXT_TAB: usize = 0;

/// Document type -> default referral purpose, as shipped by the backend.
pub const DEFAULT_PURPOSE_MAPPING: [(&str, &str); 4] = [
    ("他院への紹介", "精査加療依頼"),
    ("紹介元への逆紹介", "継続治療依頼"),
    ("返書", "受診報告"),
    ("最終返書", "治療経過報告"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub department: String,
    pub doctor: String,
    pub document_type: String,
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            department: DEFAULT_DEPARTMENT.into(),
            doctor: DEFAULT_DOCTOR.into(),
            document_type: DEFAULT_DOCUMENT_TYPE.into(),
            model: DEFAULT_MODEL.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInput {
    pub referral_purpose: String,
    pub current_prescription: String,
    pub medical_text: String,
    pub additional_info: String,
}

impl FormInput {
    pub fn has_medical_text(&self) -> bool {
        !self.medical_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub output_summary: String,
    pub parsed_summary: HashMap<String, String>,
    pub processing_time: Option<f64>,
    pub model_used: String,
    pub model_switched: bool,
}

impl GenerationResult {
    pub fn has_output(&self) -> bool {
        !self.output_summary.is_empty()
    }

    pub fn section(&self, label: &str) -> Option<&str> {
        self.parsed_summary.get(label).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub result_text: String,
    pub processing_time: Option<f64>,
}

impl EvaluationResult {
    pub fn has_result(&self) -> bool {
        !self.result_text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    #[default]
    Input,
    Output,
    Evaluation,
}
