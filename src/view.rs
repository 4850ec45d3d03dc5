//! Render projection of the panel state.
//!
//! DESIGN
//! ======
//! `PanelView::project` is a pure function of a [`PanelViewState`] and the
//! current time. It decides which banner to show and which controls are
//! enabled, so a frontend only has to draw what it is given. Controls for
//! actions whose guard condition does not hold are present but disabled.

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::state::{DelegateAllowance, PanelViewState, RemovalStage};

const SUBMITTING: &str = "Submitting transaction...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Banner {
    NotConnected,
    Loading,
    Unknown,
    Inactive,
    Activated,
    RemovalScheduled { at: String },
    RemovalDue,
}

impl Banner {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::NotConnected => "Not connected to any Safe".into(),
            Self::Loading => "Loading...".into(),
            Self::Unknown => "Guardrail status unavailable".into(),
            Self::Inactive => "Guardrail is not activated".into(),
            Self::Activated => "Guardrail is Activated!".into(),
            Self::RemovalScheduled { at } => format!("Guardrail Removal Scheduled for {at}"),
            Self::RemovalDue => "Guardrail removal is due".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Control {
    pub label: &'static str,
    pub enabled: bool,
}

impl Control {
    fn new(label: &'static str, enabled: bool, loading: bool) -> Self {
        if loading {
            Self { label: SUBMITTING, enabled: false }
        } else {
            Self { label, enabled }
        }
    }
}

/// Which delegate form the panel offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DelegateForm {
    /// "Schedule Delegate Allowance", guarded by the delay.
    Scheduled,
    /// "Immediate Delegate Allowance", only while the guard is off.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateRow {
    pub delegate: String,
    pub active: String,
    pub one_time: &'static str,
    pub reset: Control,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub banner: Banner,
    pub activate: Option<Control>,
    pub schedule_removal: Option<Control>,
    pub deactivate: Option<Control>,
    pub delegate_form: Option<DelegateForm>,
    pub delegates: Vec<DelegateRow>,
    pub delegates_caption: String,
    pub error: Option<String>,
}

/// UTC RFC 3339 rendering of epoch seconds.
#[must_use]
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok())
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| secs.to_string())
}

fn delegate_row(d: &DelegateAllowance, now_secs: u64, loading: bool) -> DelegateRow {
    let active = if d.is_active(now_secs) {
        "Yes".to_string()
    } else {
        format!("Will be active at {}", format_timestamp(d.allowed_from_epoch_seconds))
    };
    DelegateRow {
        delegate: d.delegate_address.to_string(),
        active,
        one_time: if d.is_one_time { "Yes" } else { "No" },
        reset: Control::new("Reset Allowance", true, loading),
    }
}

impl PanelView {
    #[must_use]
    pub fn project(state: &PanelViewState, now_secs: u64) -> Self {
        let loading = state.is_loading;
        let mut view = Self {
            banner: Banner::NotConnected,
            activate: None,
            schedule_removal: None,
            deactivate: None,
            delegate_form: None,
            delegates: Vec::new(),
            delegates_caption: String::new(),
            error: state.last_error.clone(),
        };
        if state.session.is_none() {
            return view;
        }

        view.delegates = state
            .delegates_info
            .iter()
            .map(|d| delegate_row(d, now_secs, loading))
            .collect();
        view.delegates_caption = if view.delegates.is_empty() {
            "No Delegates Found".into()
        } else {
            format!("Delegates count: {}", view.delegates.len())
        };

        let Some(phase) = state.phase else {
            view.banner = if loading { Banner::Loading } else { Banner::Unknown };
            return view;
        };

        match phase.removal_stage(now_secs) {
            None => {
                view.banner = Banner::Inactive;
                view.activate = Some(Control::new("Activate Guardrail", true, loading));
                view.delegate_form = Some(DelegateForm::Immediate);
            }
            Some(stage) => {
                view.banner = match stage {
                    RemovalStage::NotScheduled => Banner::Activated,
                    RemovalStage::Pending { at } => Banner::RemovalScheduled { at: format_timestamp(at) },
                    RemovalStage::Due { .. } => Banner::RemovalDue,
                };
                let not_scheduled = stage == RemovalStage::NotScheduled;
                let due = matches!(stage, RemovalStage::Due { .. });
                view.schedule_removal = Some(Control::new("Schedule Guardrail Removal", not_scheduled, loading));
                view.deactivate = Some(Control::new("Deactivate Guardrail", due, loading));
                view.delegate_form = Some(DelegateForm::Scheduled);
            }
        }
        if loading {
            view.banner = Banner::Loading;
        }
        view
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
