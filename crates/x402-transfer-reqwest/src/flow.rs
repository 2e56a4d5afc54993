//! The payer's view of one paid call.
//!
//! ```text
//! idle -> requesting -> payment_required -> signing -> confirmed -> completed
//!            \-> completed (no payment demanded)
//! any non-terminal -> error
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use x402_transfer_types::proof::PaymentProof;
use x402_transfer_types::proto::ChallengePayment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    Idle,
    Requesting,
    PaymentRequired,
    Signing,
    Confirmed,
    Completed,
    Error,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Error)
    }

    pub fn can_transition_to(&self, next: FlowStatus) -> bool {
        use FlowStatus::*;
        match (self, next) {
            (from, Error) => !from.is_terminal(),
            (Idle, Requesting)
            | (Requesting, PaymentRequired)
            | (Requesting, Completed)
            | (PaymentRequired, Signing)
            | (Signing, Confirmed)
            | (Confirmed, Completed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Idle => "idle",
            FlowStatus::Requesting => "requesting",
            FlowStatus::PaymentRequired => "payment_required",
            FlowStatus::Signing => "signing",
            FlowStatus::Confirmed => "confirmed",
            FlowStatus::Completed => "completed",
            FlowStatus::Error => "error",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a paid call, as shown to whoever initiated it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFlow {
    pub status: FlowStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<ChallengePayment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<PaymentProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type FlowObserver = Arc<dyn Fn(&PaymentFlow) + Send + Sync>;

/// Shared, observable [`PaymentFlow`].
///
/// Attach one to a request with `with_extension` to follow the payment
/// middleware's progress; the observer sees every change.
#[derive(Clone, Default)]
pub struct FlowTracker {
    flow: Arc<Mutex<PaymentFlow>>,
    observer: Option<FlowObserver>,
}

impl fmt::Debug for FlowTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowTracker")
            .field("flow", &self.snapshot())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: FlowObserver) -> Self {
        Self {
            flow: Arc::default(),
            observer: Some(observer),
        }
    }

    pub fn snapshot(&self) -> PaymentFlow {
        self.flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> FlowStatus {
        self.flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Moves to `next`, applying `update` to the flow first.
    ///
    /// Returns the refused pair if the transition is not allowed; the flow is
    /// left untouched in that case.
    pub fn transition<F>(
        &self,
        next: FlowStatus,
        message: &str,
        update: F,
    ) -> Result<(), (FlowStatus, FlowStatus)>
    where
        F: FnOnce(&mut PaymentFlow),
    {
        let snapshot = {
            let mut flow = self.flow.lock().unwrap_or_else(PoisonError::into_inner);
            if !flow.status.can_transition_to(next) {
                return Err((flow.status, next));
            }
            update(&mut flow);
            flow.status = next;
            flow.message = message.to_string();
            flow.clone()
        };
        #[cfg(feature = "telemetry")]
        tracing::debug!(status = %snapshot.status, message = %snapshot.message, "Payment flow transition");
        self.notify(&snapshot);
        Ok(())
    }

    /// Moves to `error` unless the flow already ended.
    pub fn fail(&self, error: &str) {
        let message = format!("Error: {error}");
        let _ = self.transition(FlowStatus::Error, &message, |flow| {
            flow.error = Some(error.to_string());
        });
    }

    /// Attaches the response of a completed call.
    pub fn set_result(&self, result: Option<Value>) {
        let snapshot = {
            let mut flow = self.flow.lock().unwrap_or_else(PoisonError::into_inner);
            flow.result = result;
            flow.clone()
        };
        self.notify(&snapshot);
    }

    fn notify(&self, flow: &PaymentFlow) {
        if let Some(observer) = &self.observer {
            observer(flow);
        }
    }
}
