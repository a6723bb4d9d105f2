//! View state machine for the drafting screens.
//!
//! A [`Workspace`] holds one document session: settings, form, generated
//! output, its evaluation and the screen currently shown. Generation and
//! evaluation run as independent workflows, each with its own elapsed-seconds
//! timer; a workflow counts as running exactly while its timer is active.

use std::{
    collections::HashMap, fmt, future::Future, panic::AssertUnwindSafe, sync::Arc,
    time::Duration,
};

use futures::FutureExt;
use shared::{
    domain::{
        EvaluationResult, FormInput, GenerationResult, Screen, Settings, DEFAULT_PURPOSE_MAPPING,
        FULL_TEXT_TAB,
    },
    protocol::{EvaluationRequest, SummaryRequest},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{GatewayError, WorkspaceError, DOCTOR_REFRESH_FAILED, REEVALUATE_CONFIRMATION},
    gateway::DocumentGateway,
    tabs,
    timer::ElapsedTimer,
    ClipboardSink, ConfirmationPrompt, DeclineAll, MissingClipboard,
};

pub const COPY_FEEDBACK_DURATION: Duration = Duration::from_secs(2);
const EVENT_CAPACITY: usize = 256;
const MODEL_SWITCH_NOTICE: &str = "入力が長いため、モデルを {model} に自動切替しました";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    Generation,
    Evaluation,
}

impl Workflow {
    fn target_screen(self) -> Screen {
        match self {
            Workflow::Generation => Screen::Output,
            Workflow::Evaluation => Screen::Evaluation,
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Generation => f.write_str("generation"),
            Workflow::Evaluation => f.write_str("evaluation"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub initial_settings: Settings,
    /// Document type -> default referral purpose.
    pub purpose_mapping: HashMap<String, String>,
    pub csrf_token: Option<String>,
    /// When set, a failed doctor-list refresh is shown in the error banner
    /// instead of only being logged.
    pub surface_doctor_refresh_errors: bool,
    pub copy_feedback: Duration,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            initial_settings: Settings::default(),
            purpose_mapping: DEFAULT_PURPOSE_MAPPING
                .iter()
                .map(|(document_type, purpose)| (document_type.to_string(), purpose.to_string()))
                .collect(),
            csrf_token: None,
            surface_doctor_refresh_errors: false,
            copy_feedback: COPY_FEEDBACK_DURATION,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    ScreenChanged(Screen),
    WorkflowStarted(Workflow),
    WorkflowFinished {
        workflow: Workflow,
        succeeded: bool,
        elapsed_secs: u64,
    },
    DoctorsRefreshed(Vec<String>),
    CopyStatusChanged(bool),
    Error(String),
}

/// Point-in-time copy of everything a front-end renders.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSnapshot {
    pub screen: Screen,
    pub settings: Settings,
    pub doctors: Vec<String>,
    pub form: FormInput,
    pub result: GenerationResult,
    pub evaluation: EvaluationResult,
    pub active_tab: usize,
    pub error: Option<String>,
    pub is_generating: bool,
    pub generation_elapsed_secs: u64,
    pub is_evaluating: bool,
    pub evaluation_elapsed_secs: u64,
    pub show_copy_success: bool,
}

struct WorkspaceState {
    screen: Screen,
    settings: Settings,
    doctors: Vec<String>,
    form: FormInput,
    result: GenerationResult,
    evaluation: EvaluationResult,
    active_tab: usize,
    error: Option<String>,
    generation_timer: ElapsedTimer,
    evaluation_timer: ElapsedTimer,
    show_copy_success: bool,
    copy_reset_task: Option<JoinHandle<()>>,
    /// Bumped whenever the current output is replaced or discarded. A workflow
    /// response is only applied to the epoch it was requested in.
    output_epoch: u64,
}

impl WorkspaceState {
    fn new(settings: Settings) -> Self {
        Self {
            screen: Screen::Input,
            doctors: vec![settings.doctor.clone()],
            settings,
            form: FormInput::default(),
            result: GenerationResult::default(),
            evaluation: EvaluationResult::default(),
            active_tab: FULL_TEXT_TAB,
            error: None,
            generation_timer: ElapsedTimer::new(),
            evaluation_timer: ElapsedTimer::new(),
            show_copy_success: false,
            copy_reset_task: None,
            output_epoch: 0,
        }
    }

    fn timer_mut(&mut self, workflow: Workflow) -> &mut ElapsedTimer {
        match workflow {
            Workflow::Generation => &mut self.generation_timer,
            Workflow::Evaluation => &mut self.evaluation_timer,
        }
    }

    fn clear_form(&mut self) {
        self.form = FormInput::default();
        self.result = GenerationResult::default();
        self.evaluation = EvaluationResult::default();
        self.error = None;
        self.output_epoch += 1;
    }

    fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            screen: self.screen,
            settings: self.settings.clone(),
            doctors: self.doctors.clone(),
            form: self.form.clone(),
            result: self.result.clone(),
            evaluation: self.evaluation.clone(),
            active_tab: self.active_tab,
            error: self.error.clone(),
            is_generating: self.generation_timer.is_running(),
            generation_elapsed_secs: self.generation_timer.elapsed_secs(),
            is_evaluating: self.evaluation_timer.is_running(),
            evaluation_elapsed_secs: self.evaluation_timer.elapsed_secs(),
            show_copy_success: self.show_copy_success,
        }
    }
}

fn summary_request(form: &FormInput, settings: &Settings) -> SummaryRequest {
    SummaryRequest {
        referral_purpose: form.referral_purpose.clone(),
        current_prescription: form.current_prescription.clone(),
        medical_text: form.medical_text.clone(),
        additional_info: form.additional_info.clone(),
        department: settings.department.clone(),
        doctor: settings.doctor.clone(),
        document_type: settings.document_type.clone(),
        model: settings.model.clone(),
    }
}

fn evaluation_request(
    form: &FormInput,
    settings: &Settings,
    result: &GenerationResult,
) -> EvaluationRequest {
    EvaluationRequest {
        document_type: settings.document_type.clone(),
        input_text: form.medical_text.clone(),
        current_prescription: form.current_prescription.clone(),
        additional_info: form.additional_info.clone(),
        output_summary: result.output_summary.clone(),
    }
}

pub struct Workspace {
    gateway: Arc<dyn DocumentGateway>,
    confirmation: Arc<dyn ConfirmationPrompt>,
    clipboard: Arc<dyn ClipboardSink>,
    config: WorkspaceConfig,
    inner: Mutex<WorkspaceState>,
    events: broadcast::Sender<WorkspaceEvent>,
}

impl Workspace {
    pub fn new(gateway: Arc<dyn DocumentGateway>, config: WorkspaceConfig) -> Arc<Self> {
        Self::new_with_dependencies(
            gateway,
            Arc::new(DeclineAll),
            Arc::new(MissingClipboard),
            config,
        )
    }

    pub fn new_with_dependencies(
        gateway: Arc<dyn DocumentGateway>,
        confirmation: Arc<dyn ConfirmationPrompt>,
        clipboard: Arc<dyn ClipboardSink>,
        config: WorkspaceConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            gateway,
            confirmation,
            clipboard,
            inner: Mutex::new(WorkspaceState::new(config.initial_settings.clone())),
            config,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.config.csrf_token.as_deref()
    }

    pub async fn snapshot(&self) -> WorkspaceSnapshot {
        self.inner.lock().await.snapshot()
    }

    fn record_error(&self, state: &mut WorkspaceState, message: String) {
        state.error = Some(message.clone());
        let _ = self.events.send(WorkspaceEvent::Error(message));
    }

    fn fail(&self, state: &mut WorkspaceState, err: WorkspaceError) -> WorkspaceError {
        self.record_error(state, err.to_string());
        err
    }

    fn set_screen(&self, state: &mut WorkspaceState, screen: Screen) {
        if state.screen != screen {
            debug!(from = ?state.screen, to = ?screen, "workspace: screen changed");
            state.screen = screen;
            let _ = self.events.send(WorkspaceEvent::ScreenChanged(screen));
        }
    }

    fn apply_referral_purpose(&self, state: &mut WorkspaceState) {
        if let Some(purpose) = self
            .config
            .purpose_mapping
            .get(&state.settings.document_type)
        {
            state.form.referral_purpose = purpose.clone();
        }
    }

    /// Loads the doctor list for the current department and fills in the
    /// referral purpose for the current document type.
    pub async fn init(&self) {
        if let Err(err) = self.refresh_doctors().await {
            debug!(error = ?err, "settings: keeping initial doctor list");
        }
        let mut state = self.inner.lock().await;
        self.apply_referral_purpose(&mut state);
    }

    /// Replaces the doctor list with the backend's list for the current
    /// department. When the selected doctor is not on the new list the first
    /// entry is selected. Failures keep the previous list.
    pub async fn refresh_doctors(&self) -> Result<(), WorkspaceError> {
        let department = self.inner.lock().await.settings.department.clone();
        let fetched = self.gateway.doctors(&department).await;

        let mut state = self.inner.lock().await;
        let doctors = match fetched {
            Ok(doctors) if !doctors.is_empty() => doctors,
            Ok(_) => {
                warn!(department = %department, "settings: backend returned no doctors");
                return Ok(());
            }
            Err(err) => {
                warn!(department = %department, error = ?err, "settings: doctor list refresh failed");
                if self.config.surface_doctor_refresh_errors
                    && state.settings.department == department
                {
                    self.record_error(&mut state, DOCTOR_REFRESH_FAILED.to_string());
                }
                return Err(err.into());
            }
        };

        if state.settings.department != department {
            debug!(department = %department, "settings: dropping doctor list for stale department");
            return Ok(());
        }

        if !doctors.contains(&state.settings.doctor) {
            if let Some(first) = doctors.first() {
                info!(
                    department = %department,
                    previous = %state.settings.doctor,
                    selected = %first,
                    "settings: selected doctor no longer valid"
                );
                state.settings.doctor = first.clone();
            }
        }
        state.doctors = doctors.clone();
        drop(state);

        let _ = self.events.send(WorkspaceEvent::DoctorsRefreshed(doctors));
        Ok(())
    }

    /// Switches department and refreshes the doctor list in the background.
    pub async fn select_department(self: &Arc<Self>, department: &str) -> JoinHandle<()> {
        self.inner.lock().await.settings.department = department.to_string();

        let workspace = Arc::clone(self);
        tokio::spawn(async move {
            let _ = workspace.refresh_doctors().await;
        })
    }

    pub async fn select_doctor(&self, doctor: &str) -> Result<(), WorkspaceError> {
        let mut state = self.inner.lock().await;
        if !state.doctors.iter().any(|candidate| candidate == doctor) {
            return Err(WorkspaceError::UnknownDoctor {
                department: state.settings.department.clone(),
                doctor: doctor.to_string(),
            });
        }
        state.settings.doctor = doctor.to_string();
        Ok(())
    }

    pub async fn select_document_type(&self, document_type: &str) {
        let mut state = self.inner.lock().await;
        state.settings.document_type = document_type.to_string();
        self.apply_referral_purpose(&mut state);
    }

    pub async fn select_model(&self, model: &str) {
        self.inner.lock().await.settings.model = model.to_string();
    }

    pub async fn edit_form(&self, edit: impl FnOnce(&mut FormInput)) {
        edit(&mut self.inner.lock().await.form);
    }

    pub async fn select_tab(&self, tab_index: usize) -> Result<(), WorkspaceError> {
        if tab_index >= tabs::TAB_COUNT {
            return Err(WorkspaceError::TabOutOfRange(tab_index));
        }
        self.inner.lock().await.active_tab = tab_index;
        Ok(())
    }

    pub async fn generate_summary(self: &Arc<Self>) -> Result<(), WorkspaceError> {
        let (request, epoch) = {
            let mut state = self.inner.lock().await;
            if state.generation_timer.is_running() {
                warn!("generation: request already running, rejecting");
                return Err(WorkspaceError::Busy(Workflow::Generation));
            }
            if !state.form.has_medical_text() {
                return Err(self.fail(&mut state, WorkspaceError::MissingMedicalText));
            }
            state.error = None;
            state.generation_timer.start();
            (
                summary_request(&state.form, &state.settings),
                state.output_epoch,
            )
        };

        let gateway = Arc::clone(&self.gateway);
        self.run_workflow(
            Workflow::Generation,
            async move { gateway.generate(request).await },
            move |state: &mut WorkspaceState, result: GenerationResult| {
                if state.output_epoch != epoch {
                    info!("generation: session discarded while generating, dropping result");
                    return false;
                }
                state.result = result;
                // an evaluation only describes the output it was computed against
                state.evaluation = EvaluationResult::default();
                state.output_epoch += 1;
                state.active_tab = FULL_TEXT_TAB;
                true
            },
        )
        .await
    }

    pub async fn evaluate_output(self: &Arc<Self>) -> Result<(), WorkspaceError> {
        let needs_confirmation = {
            let mut state = self.inner.lock().await;
            if !state.result.has_output() {
                return Err(self.fail(&mut state, WorkspaceError::NoOutput));
            }
            if state.evaluation_timer.is_running() {
                warn!("evaluation: request already running, rejecting");
                return Err(WorkspaceError::Busy(Workflow::Evaluation));
            }
            state.evaluation.has_result()
        };

        if needs_confirmation && !self.confirmation.confirm(REEVALUATE_CONFIRMATION).await {
            info!("evaluation: re-evaluation declined");
            return Ok(());
        }

        let (request, epoch) = {
            let mut state = self.inner.lock().await;
            // the session may have moved on while the prompt was open
            if !state.result.has_output() {
                return Err(self.fail(&mut state, WorkspaceError::NoOutput));
            }
            if state.evaluation_timer.is_running() {
                return Err(WorkspaceError::Busy(Workflow::Evaluation));
            }
            state.error = None;
            state.evaluation_timer.start();
            (
                evaluation_request(&state.form, &state.settings, &state.result),
                state.output_epoch,
            )
        };

        let gateway = Arc::clone(&self.gateway);
        self.run_workflow(
            Workflow::Evaluation,
            async move { gateway.evaluate(request).await },
            move |state: &mut WorkspaceState, evaluation: EvaluationResult| {
                if state.output_epoch != epoch {
                    info!("evaluation: output changed while evaluating, discarding result");
                    return false;
                }
                state.evaluation = evaluation;
                true
            },
        )
        .await
    }

    /// Runs a started workflow's request and its finalization in a detached
    /// task, so the timer is stopped even when the caller stops polling or the
    /// gateway panics. `apply` installs the response and returns whether the
    /// workflow's target screen should be shown.
    async fn run_workflow<T, Fut, Apply>(
        self: &Arc<Self>,
        workflow: Workflow,
        call: Fut,
        apply: Apply,
    ) -> Result<(), WorkspaceError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
        Apply: FnOnce(&mut WorkspaceState, T) -> bool + Send + 'static,
    {
        info!(%workflow, "workflow: started");
        let _ = self.events.send(WorkspaceEvent::WorkflowStarted(workflow));

        let workspace = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(call)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(GatewayError::transport(format!("{workflow} request panicked")))
                });
            workspace.finish_workflow(workflow, outcome, apply).await
        });

        task.await
            .unwrap_or_else(|err| Err(WorkspaceError::Gateway(GatewayError::transport(err))))
    }

    async fn finish_workflow<T, Apply>(
        &self,
        workflow: Workflow,
        outcome: Result<T, GatewayError>,
        apply: Apply,
    ) -> Result<(), WorkspaceError>
    where
        Apply: FnOnce(&mut WorkspaceState, T) -> bool,
    {
        let mut state = self.inner.lock().await;
        let result = match outcome {
            Ok(value) => {
                if apply(&mut state, value) {
                    self.set_screen(&mut state, workflow.target_screen());
                }
                Ok(())
            }
            Err(err) => {
                warn!(%workflow, error = ?err, "workflow: request failed");
                self.record_error(&mut state, err.to_string());
                Err(WorkspaceError::Gateway(err))
            }
        };

        let timer = state.timer_mut(workflow);
        let elapsed_secs = timer.elapsed_secs();
        timer.stop();
        drop(state);

        info!(
            %workflow,
            succeeded = result.is_ok(),
            elapsed_secs,
            "workflow: finished"
        );
        let _ = self.events.send(WorkspaceEvent::WorkflowFinished {
            workflow,
            succeeded: result.is_ok(),
            elapsed_secs,
        });
        result
    }

    /// Resets form, output and evaluation. The screen is left alone.
    pub async fn clear_form(&self) {
        self.inner.lock().await.clear_form();
    }

    /// Discards the current session and returns to the input screen.
    pub async fn back_to_input(&self) {
        let mut state = self.inner.lock().await;
        state.clear_form();
        self.set_screen(&mut state, Screen::Input);
        state.error = None;
    }

    pub async fn back_to_output(&self) -> Result<(), WorkspaceError> {
        let mut state = self.inner.lock().await;
        match state.screen {
            Screen::Evaluation => {
                self.set_screen(&mut state, Screen::Output);
                Ok(())
            }
            Screen::Output => Ok(()),
            Screen::Input => Err(WorkspaceError::InvalidTransition {
                from: Screen::Input,
                to: Screen::Output,
            }),
        }
    }

    pub async fn show_evaluation(&self) -> Result<(), WorkspaceError> {
        let mut state = self.inner.lock().await;
        if !state.result.has_output() {
            return Err(WorkspaceError::NoOutput);
        }
        match state.screen {
            Screen::Output => {
                self.set_screen(&mut state, Screen::Evaluation);
                Ok(())
            }
            Screen::Evaluation => Ok(()),
            Screen::Input => Err(WorkspaceError::InvalidTransition {
                from: Screen::Input,
                to: Screen::Evaluation,
            }),
        }
    }

    /// Writes `text` to the clipboard. On success the copy indicator is shown
    /// and cleared again after the configured delay; a later copy restarts
    /// the delay.
    pub async fn copy_to_clipboard(self: &Arc<Self>, text: &str) -> Result<(), WorkspaceError> {
        if let Err(err) = self.clipboard.write_text(text).await {
            warn!(error = %err, "clipboard: write failed");
            let mut state = self.inner.lock().await;
            return Err(self.fail(
                &mut state,
                WorkspaceError::Clipboard {
                    reason: err.to_string(),
                },
            ));
        }

        let mut state = self.inner.lock().await;
        state.show_copy_success = true;
        if let Some(previous) = state.copy_reset_task.take() {
            previous.abort();
        }

        let workspace = Arc::clone(self);
        let delay = self.config.copy_feedback;
        state.copy_reset_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = workspace.inner.lock().await;
            state.show_copy_success = false;
            state.copy_reset_task = None;
            drop(state);
            let _ = workspace.events.send(WorkspaceEvent::CopyStatusChanged(false));
        }));
        drop(state);

        let _ = self.events.send(WorkspaceEvent::CopyStatusChanged(true));
        Ok(())
    }

    pub async fn copy_current_tab(self: &Arc<Self>) -> Result<(), WorkspaceError> {
        let text = self.current_tab_content().await;
        self.copy_to_clipboard(&text).await
    }

    pub async fn current_tab_content(&self) -> String {
        let state = self.inner.lock().await;
        tabs::resolve(state.active_tab, &state.result).to_string()
    }

    pub async fn is_active_tab(&self, tab_index: usize) -> bool {
        self.inner.lock().await.active_tab == tab_index
    }

    pub async fn tab_style_class(&self, tab_index: usize) -> &'static str {
        tabs::style_class(tab_index, self.inner.lock().await.active_tab)
    }

    /// Banner text for a response where the backend substituted the model.
    pub async fn model_switch_notice(&self) -> Option<String> {
        let state = self.inner.lock().await;
        if !state.result.model_switched {
            return None;
        }
        Some(MODEL_SWITCH_NOTICE.replace("{model}", &state.result.model_used))
    }
}

#[cfg(test)]
#[path = "tests/workspace_tests.rs"]
mod tests;
