//! JSON bodies exchanged between payer and paywall.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::amount::{NativeAmount, Price};
use crate::lit_str;
use crate::network::NetworkId;
use crate::price::PriceSpec;

lit_str!(PaymentRequiredStatus, "payment_required");

/// Header carrying the encoded proof on a paid request.
pub const PAYMENT_HEADER: &str = "X-Payment";
/// Query parameter carrying the encoded proof when headers are unavailable.
pub const PAYMENT_QUERY_PARAM: &str = "payment";
/// Response header carrying the base64 receipt of an admitted payment.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-Payment-Response";

/// Message on the first challenge, when no proof was attached.
pub const MESSAGE_PAYMENT_REQUIRED: &str = "Payment required to access this service";
/// Message when a proof was attached but rejected.
pub const MESSAGE_PAYMENT_INVALID: &str = "Invalid payment signature or transaction";
pub const INSTRUCTION: &str =
    "Include X-Payment header with an encoded payment proof or add ?payment=<proof> to the query";

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequired {
    pub status: PaymentRequiredStatus,
    pub message: String,
    pub payment: ChallengePayment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl PaymentRequired {
    /// Challenge for a call without any proof.
    pub fn missing(payment: ChallengePayment) -> Self {
        Self {
            status: PaymentRequiredStatus,
            message: MESSAGE_PAYMENT_REQUIRED.to_string(),
            payment,
            instruction: Some(INSTRUCTION.to_string()),
        }
    }

    /// Challenge for a call whose proof was rejected. Carries no rejection detail.
    pub fn rejected(payment: ChallengePayment) -> Self {
        Self {
            status: PaymentRequiredStatus,
            message: MESSAGE_PAYMENT_INVALID.to_string(),
            payment,
            instruction: None,
        }
    }
}

/// The price block of a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayment {
    pub amount: Price,
    /// Native currency of the settlement network.
    pub currency: String,
    pub network: NetworkId,
    pub description: String,
    pub receiver_address: Address,
    /// The converted amount the verifier will require, when the server could compute it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_amount: Option<NativeAmount>,
}

impl ChallengePayment {
    pub fn new(spec: &PriceSpec, currency: &str, native_amount: Option<NativeAmount>) -> Self {
        Self {
            amount: spec.amount.clone(),
            currency: currency.to_string(),
            network: spec.network.clone(),
            description: spec.description.clone(),
            receiver_address: spec.recipient_address,
            native_amount,
        }
    }
}

/// Body of a generic server failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn internal() -> Self {
        Self {
            error: "Internal server error".to_string(),
            message: Some("The service failed to process a paid request".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_wire_shape() {
        let spec = PriceSpec::new("$0.02", "test-net", "0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e")
            .unwrap()
            .with_description("Summaries");
        let body = PaymentRequired::missing(ChallengePayment::new(&spec, "TST", None));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "payment_required");
        assert_eq!(json["payment"]["amount"], "$0.02");
        assert_eq!(json["payment"]["currency"], "TST");
        assert_eq!(json["payment"]["network"], "test-net");
        assert_eq!(json["payment"]["description"], "Summaries");
        assert!(json["payment"]["receiverAddress"].is_string());
        assert!(json["payment"].get("nativeAmount").is_none());
        assert!(json["instruction"].is_string());

        let rejected = PaymentRequired::rejected(body.payment.clone());
        let json = serde_json::to_value(&rejected).unwrap();
        assert!(json.get("instruction").is_none());
        assert_eq!(json["message"], MESSAGE_PAYMENT_INVALID);
    }

    #[test]
    fn status_marker_is_enforced() {
        let json = r#"{"status":"ok","message":"","payment":{"amount":"$1","currency":"AVAX","network":"avalanche","description":"","receiverAddress":"0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e"}}"#;
        assert!(serde_json::from_str::<PaymentRequired>(json).is_err());
        let json = json.replace("\"ok\"", "\"payment_required\"");
        assert!(serde_json::from_str::<PaymentRequired>(&json).is_ok());
    }
}
