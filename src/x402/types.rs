//! x402 wire types
//!
//! Shapes of the 402 challenge body, the facilitator request/response bodies
//! and the `X-Payment` / `X-Payment-Response` headers.

use crate::config::X402Config;
use crate::error::{ModexoError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PAYMENT_HEADER: &str = "x-payment";
pub const PAYMENT_SESSION_HEADER: &str = "x-payment-session";
pub const PAYMENT_RESPONSE_HEADER: &str = "x-payment-response";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Price in the asset's atomic units
    pub max_amount_required: String,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: String,
    pub asset: String,
    pub max_timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    pub fn new(
        config: &X402Config,
        amount: Decimal,
        resource: &str,
        description: &str,
        output_schema: Option<Value>,
        session_id: &str,
    ) -> Self {
        Self {
            scheme: config.scheme.clone(),
            network: config.network.clone(),
            max_amount_required: to_atomic_units(amount, config.asset_decimals),
            resource: resource.to_string(),
            description: description.to_string(),
            mime_type: "application/json".to_string(),
            pay_to: config.pay_to.clone(),
            asset: config.asset.clone(),
            max_timeout_seconds: config.max_timeout_seconds,
            output_schema,
            extra: Some(json!({ "sessionId": session_id })),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.extra.as_ref()?.get("sessionId")?.as_str()
    }
}

/// Body of an HTTP 402 response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub x402_version: u32,
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}

/// Body posted to the facilitator's `/verify` and `/settle`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest<'a> {
    pub x402_version: u32,
    pub payment_payload: &'a Value,
    pub payment_requirements: &'a PaymentRequirements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default)]
    pub invalid_reason: Option<String>,
    #[serde(default)]
    pub payer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default)]
    pub error_reason: Option<String>,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub payer: Option<String>,
}

/// `amount * 10^decimals`, rounded to a whole number of atomic units
pub fn to_atomic_units(amount: Decimal, decimals: u32) -> String {
    let scale = Decimal::from(10u64.pow(decimals.min(18)));
    (amount * scale).round().to_string()
}

/// Decode the base64 JSON `X-Payment` header
pub fn decode_payment_header(header: &str) -> Result<Value> {
    let bytes = STANDARD.decode(header.trim())?;
    let payload: Value = serde_json::from_slice(&bytes)?;
    if !payload.is_object() {
        return Err(ModexoError::PaymentRequired(
            "payment payload must be a JSON object".to_string(),
        ));
    }
    Ok(payload)
}

/// Encode a settlement for the `X-Payment-Response` header
pub fn encode_settlement_header(settlement: &SettleResponse) -> Result<String> {
    Ok(STANDARD.encode(serde_json::to_vec(settlement)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_atomic_units() {
        assert_eq!(to_atomic_units(dec!(0.01), 6), "10000");
        assert_eq!(to_atomic_units(dec!(0.005), 6), "5000");
        assert_eq!(to_atomic_units(dec!(0.0000004), 6), "0");
        assert_eq!(to_atomic_units(dec!(1.5), 6), "1500000");
    }

    #[test]
    fn test_requirements_wire_shape() {
        let req = PaymentRequirements::new(
            &X402Config::default(),
            dec!(0.02),
            "/api/agents/smart-entry",
            "Smart entry",
            None,
            "sess-1",
        );
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["maxAmountRequired"], "20000");
        assert_eq!(v["mimeType"], "application/json");
        assert_eq!(v["extra"]["sessionId"], "sess-1");
        assert!(v.get("outputSchema").is_none());
        assert_eq!(req.session_id(), Some("sess-1"));
    }

    #[test]
    fn test_payment_header_decoding() {
        let header = STANDARD.encode(br#"{"x402Version":1,"scheme":"exact","payload":{}}"#);
        let payload = decode_payment_header(&header).unwrap();
        assert_eq!(payload["scheme"], "exact");

        assert!(decode_payment_header("%%%not-base64").is_err());
        assert!(decode_payment_header(&STANDARD.encode(b"[1,2]")).is_err());
        assert!(decode_payment_header(&STANDARD.encode(b"not json")).is_err());
    }

    #[test]
    fn test_settlement_header_round_trip() {
        let settle = SettleResponse {
            success: true,
            transaction: Some("5abc".to_string()),
            network: Some("solana".to_string()),
            ..Default::default()
        };
        let header = encode_settlement_header(&settle).unwrap();
        let decoded: SettleResponse =
            serde_json::from_slice(&STANDARD.decode(header).unwrap()).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.transaction.as_deref(), Some("5abc"));
    }
}
