//! Error types and the user-facing messages they render to.
//!
//! The `Display` output of both error enums is exactly what the front-end
//! shows in its error banner.

use std::fmt::Display;

use shared::domain::Screen;
use thiserror::Error;

use crate::workspace::Workflow;

pub const NO_INPUT: &str = "カルテ情報を入力してください";
pub const API_ERROR: &str = "API エラーが発生しました";
pub const GENERATION_FAILED: &str = "エラーが発生しました";
pub const EVALUATION_FAILED: &str = "評価中にエラーが発生しました";
pub const NO_OUTPUT_TO_EVALUATE: &str = "評価対象の出力がありません";
pub const REEVALUATE_CONFIRMATION: &str = "前回の評価をクリアして再評価しますか？";
pub const COPY_FAILED: &str = "テキストのコピーに失敗しました";
pub const DOCTOR_REFRESH_FAILED: &str = "医師リストの取得に失敗しました";

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Connection failure or a body that could not be decoded.
    #[error("{}", API_ERROR)]
    Transport { reason: String },
    #[error("{}", API_ERROR)]
    Status { status: u16, detail: Option<String> },
    /// Well-formed response carrying `success: false`.
    #[error("{0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn transport(reason: impl Display) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }

    pub fn rejected(message: Option<String>, fallback: &str) -> Self {
        Self::Rejected(
            message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        )
    }
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("{}", NO_INPUT)]
    MissingMedicalText,
    #[error("{}", NO_OUTPUT_TO_EVALUATE)]
    NoOutput,
    #[error("{0} request is already running")]
    Busy(Workflow),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{}", COPY_FAILED)]
    Clipboard { reason: String },
    #[error("cannot move from {from:?} screen to {to:?} screen")]
    InvalidTransition { from: Screen, to: Screen },
    #[error("doctor '{doctor}' is not available for department '{department}'")]
    UnknownDoctor { department: String, doctor: String },
    #[error("tab index {0} is out of range")]
    TabOutOfRange(usize),
}
