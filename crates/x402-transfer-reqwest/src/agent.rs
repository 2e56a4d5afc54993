use reqwest::{IntoUrl, Method};
use reqwest_middleware as rqm;
use serde_json::Value;
use std::sync::Arc;
use x402_transfer_types::ledger::LedgerClient;

use crate::builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild};
use crate::flow::{FlowObserver, FlowStatus, FlowTracker, PaymentFlow};
use crate::middleware::PaymentHandler;

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Runs paid calls end to end and reports how each one went.
///
/// ```rust,no_run
/// use alloy_primitives::address;
/// use reqwest::Method;
/// use serde_json::json;
/// use x402_transfer_reqwest::{PayerAgent, PaymentHandler, Wallet};
/// use x402_transfer_types::ledger::InMemoryLedger;
///
/// # async fn run() {
/// let wallet = Wallet::connected(
///     address!("0x1111111111111111111111111111111111111111"),
///     "avalanche-fuji",
///     InMemoryLedger::new(),
/// );
/// let agent = PayerAgent::new(PaymentHandler::new(wallet))
///     .with_observer(|flow| println!("{}: {}", flow.status, flow.message));
/// let flow = agent
///     .call(Method::POST, "http://localhost:3000/api/agent-call", Some(json!({ "action": "ping" })))
///     .await;
/// println!("{:?}", flow.result);
/// # }
/// ```
#[derive(Clone)]
pub struct PayerAgent {
    client: rqm::ClientWithMiddleware,
    observer: Option<FlowObserver>,
}

impl PayerAgent {
    pub fn new<L: LedgerClient + 'static>(handler: PaymentHandler<L>) -> Self {
        Self::from_client(reqwest::Client::new().with_payments(handler).build())
    }

    /// Uses a client that already carries a [`PaymentHandler`].
    pub fn from_client(client: rqm::ClientWithMiddleware) -> Self {
        Self {
            client,
            observer: None,
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&PaymentFlow) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Performs one call, paying if challenged. Never panics or errors: the
    /// outcome is the returned flow, `completed` with a result or `error`.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.reqwest.agent_call", skip_all, fields(%method))
    )]
    pub async fn call<U: IntoUrl>(&self, method: Method, url: U, body: Option<Value>) -> PaymentFlow {
        let tracker = match &self.observer {
            Some(observer) => FlowTracker::with_observer(observer.clone()),
            None => FlowTracker::new(),
        };
        let mut request = self
            .client
            .request(method, url)
            .with_extension(tracker.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }
        match request.send().await {
            Ok(response) if tracker.status() == FlowStatus::Completed => {
                let result = response.json::<Value>().await.ok();
                tracker.set_result(result);
            }
            // No-ops when the middleware already ended the flow.
            Ok(response) => tracker.fail(&format!("Request failed with status {}", response.status())),
            Err(err) => tracker.fail(&err.to_string()),
        }
        tracker.snapshot()
    }
}
