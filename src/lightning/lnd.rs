// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LND client over the REST gateway.
//!
//! Byte fields travel as standard base64 and 64-bit integers as JSON strings
//! on this API. Both are converted at this boundary so the rest of the crate
//! only sees hex hashes and `u64` amounts.

use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::json;

use super::{
    AddedInvoice, DecodedPayReq, Invoice, InvoiceRequest, InvoiceStream, LightningClient,
    LightningError, PaymentLookup, SendOutcome,
};

const MACAROON_HEADER: &str = "grpc-metadata-macaroon";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_PAYMENTS_PAGE: u32 = 1000;

/// Connection settings for [`LndRestClient`].
#[derive(Debug, Clone)]
pub struct LndConfig {
    /// e.g. `https://127.0.0.1:8080`
    pub rest_url: String,
    pub macaroon_hex: String,
    /// PEM certificate of the node, trusted as an extra root
    pub tls_cert_path: Option<PathBuf>,
    /// Per-request bound for unary calls
    pub request_timeout: Duration,
    /// Per-request bound for `SendPaymentSync`
    pub payment_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LndRestClient {
    base_url: String,
    request_timeout: Duration,
    payment_timeout: Duration,
    http: Client,
}

impl LndRestClient {
    pub fn new(config: &LndConfig) -> Result<Self, LightningError> {
        hex::decode(config.macaroon_hex.trim())
            .map_err(|e| LightningError::Transport(format!("macaroon is not valid hex: {e}")))?;

        let mut macaroon = HeaderValue::from_str(config.macaroon_hex.trim())
            .map_err(|e| LightningError::Transport(format!("invalid macaroon header: {e}")))?;
        macaroon.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(MACAROON_HEADER, macaroon);

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(path) = &config.tls_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                LightningError::Transport(format!("failed to read {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| LightningError::Transport(format!("invalid TLS certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| LightningError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            payment_timeout: config.payment_timeout,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, timeout: Duration) -> Result<Response, LightningError> {
        request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<T, LightningError> {
        let response = self.send(request, timeout).await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| LightningError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LightningClient for LndRestClient {
    async fn add_invoice(&self, request: InvoiceRequest) -> Result<AddedInvoice, LightningError> {
        let mut body = json!({
            "value": request.value_sat.to_string(),
            "expiry": request.expiry_secs.to_string(),
        });
        if let Some(memo) = request.memo {
            body["memo"] = json!(memo);
        }

        let added: LndAddInvoiceResponse = self
            .call(self.http.post(self.url("/v1/invoices")).json(&body), self.request_timeout)
            .await?;

        Ok(AddedInvoice {
            r_hash: b64_to_hex(&added.r_hash)?,
            payment_request: added.payment_request,
        })
    }

    async fn lookup_invoice(&self, r_hash: &str) -> Result<Invoice, LightningError> {
        let url = self.url(&format!("/v1/invoice/{}", r_hash.to_ascii_lowercase()));
        match self.call::<LndInvoice>(self.http.get(url), self.request_timeout).await {
            Ok(invoice) => invoice.try_into(),
            Err(LightningError::Rpc { status, message })
                if status == StatusCode::NOT_FOUND.as_u16()
                    || message.contains("unable to locate invoice") =>
            {
                Err(LightningError::NotFound(format!("invoice {r_hash}")))
            }
            Err(e) => Err(e),
        }
    }

    async fn decode_pay_req(&self, payment_request: &str) -> Result<DecodedPayReq, LightningError> {
        let trimmed = payment_request.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LightningError::InvalidPaymentRequest(
                "payment request must be a non-empty bech32 string".to_string(),
            ));
        }

        let url = self.url(&format!("/v1/payreq/{trimmed}"));
        let decoded: LndPayReq = match self.call(self.http.get(url), self.request_timeout).await {
            Ok(decoded) => decoded,
            Err(LightningError::Rpc { status, message }) if matches!(status, 400 | 500) => {
                return Err(LightningError::InvalidPaymentRequest(message));
            }
            Err(e) => return Err(e),
        };

        Ok(DecodedPayReq {
            payment_hash: decoded.payment_hash.to_ascii_lowercase(),
            num_satoshis: decoded.num_satoshis,
            description: decoded.description,
            expiry_secs: decoded.expiry as i64,
        })
    }

    async fn send_payment_sync(&self, payment_request: &str) -> Result<SendOutcome, LightningError> {
        let body = json!({ "payment_request": payment_request });
        let request = self.http.post(self.url("/v1/channels/transactions")).json(&body);

        let response: LndSendResponse = match self.call(request, self.payment_timeout).await {
            Ok(response) => response,
            Err(e) => {
                let definitive = !e.is_transient();
                match e {
                    // The node answered and refused the payment outright.
                    LightningError::Rpc { message, .. } if definitive => {
                        return Ok(SendOutcome::Failed { reason: message });
                    }
                    other => return Err(other),
                }
            }
        };

        if !response.payment_error.is_empty() {
            return Ok(SendOutcome::Failed {
                reason: response.payment_error,
            });
        }

        let preimage = Base64::decode_vec(&response.payment_preimage)
            .map_err(|e| LightningError::InvalidResponse(format!("payment_preimage: {e}")))?;
        if preimage.len() != 32 {
            return Err(LightningError::InvalidResponse(
                "payment succeeded without a 32-byte preimage".to_string(),
            ));
        }
        Ok(SendOutcome::Succeeded { preimage })
    }

    async fn lookup_payment(&self, payment_hash: &str) -> Result<PaymentLookup, LightningError> {
        let hash = payment_hash.to_ascii_lowercase();
        let mut matching = Vec::new();
        let mut index_offset = 0u64;

        // Newest first, one page at a time, until the history is exhausted.
        loop {
            let url = self.url(&format!(
                "/v1/payments?include_incomplete=true&reversed=true\
                 &max_payments={LIST_PAYMENTS_PAGE}&index_offset={index_offset}"
            ));
            let page: LndListPayments = self.call(self.http.get(url), self.request_timeout).await?;
            let page_len = page.payments.len();

            matching.extend(
                page.payments
                    .into_iter()
                    .filter(|p| p.payment_hash.eq_ignore_ascii_case(&hash)),
            );
            if matching.iter().any(|p| p.status == "SUCCEEDED") {
                break;
            }

            let exhausted = page_len < LIST_PAYMENTS_PAGE as usize
                || page.first_index_offset <= 1
                || (index_offset != 0 && page.first_index_offset >= index_offset);
            if exhausted {
                break;
            }
            index_offset = page.first_index_offset;
        }

        resolve_payment_status(matching.into_iter())
    }

    async fn subscribe_invoices(&self) -> Result<InvoiceStream, LightningError> {
        // No request timeout: the response body is an open-ended stream.
        let response = self
            .http
            .get(self.url("/v1/invoices/subscribe"))
            .send()
            .await
            .map_err(|e| LightningError::Transport(e.to_string()))?;
        let response = check_status(response).await?;

        Ok(Box::pin(invoice_frames(response.bytes_stream())))
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct LndAddInvoiceResponse {
    r_hash: String,
    payment_request: String,
}

#[derive(Debug, Deserialize)]
struct LndInvoice {
    #[serde(default)]
    memo: String,
    #[serde(default)]
    r_preimage: String,
    r_hash: String,
    #[serde(default, deserialize_with = "u64_from_str")]
    value: u64,
    #[serde(default)]
    settled: bool,
    #[serde(default)]
    state: String,
    #[serde(default)]
    payment_request: String,
    #[serde(default, deserialize_with = "u64_from_str")]
    expiry: u64,
}

impl TryFrom<LndInvoice> for Invoice {
    type Error = LightningError;

    fn try_from(raw: LndInvoice) -> Result<Self, Self::Error> {
        let settled = raw.settled || raw.state == "SETTLED";
        let preimage = if settled && !raw.r_preimage.is_empty() {
            Some(
                Base64::decode_vec(&raw.r_preimage)
                    .map_err(|e| LightningError::InvalidResponse(format!("r_preimage: {e}")))?,
            )
        } else {
            None
        };

        Ok(Invoice {
            r_hash: b64_to_hex(&raw.r_hash)?,
            payment_request: raw.payment_request,
            value_sat: raw.value,
            memo: raw.memo,
            settled,
            preimage,
            expiry_secs: raw.expiry as i64,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LndPayReq {
    payment_hash: String,
    #[serde(default, deserialize_with = "u64_from_str")]
    num_satoshis: u64,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "u64_from_str")]
    expiry: u64,
}

#[derive(Debug, Deserialize)]
struct LndSendResponse {
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    payment_preimage: String,
}

#[derive(Debug, Deserialize)]
struct LndListPayments {
    #[serde(default)]
    payments: Vec<LndPayment>,
    /// Index of the oldest payment in this page
    #[serde(default, deserialize_with = "u64_from_str")]
    first_index_offset: u64,
}

#[derive(Debug, Deserialize)]
struct LndPayment {
    payment_hash: String,
    /// Hex on this endpoint, unlike the invoice endpoints
    #[serde(default)]
    payment_preimage: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    failure_reason: String,
}

#[derive(Debug, Deserialize)]
struct LndErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    result: Option<LndInvoice>,
    #[serde(default)]
    error: Option<LndErrorBody>,
}

/// LND encodes 64-bit integers as strings; accept either form.
fn u64_from_str<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) if s.is_empty() => Ok(0),
        Raw::Str(s) => s.parse().map_err(D::Error::custom),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn b64_to_hex(value: &str) -> Result<String, LightningError> {
    Base64::decode_vec(value)
        .map(hex::encode)
        .map_err(|e| LightningError::InvalidResponse(format!("invalid base64 field: {e}")))
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> LightningError {
    if error.is_timeout() {
        LightningError::Timeout(timeout)
    } else {
        LightningError::Transport(error.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, LightningError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<LndErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or(body);
    Err(LightningError::Rpc {
        status: status.as_u16(),
        message,
    })
}

/// Collapse every node record for one hash into a single status.
///
/// A hash can carry several attempts; any success wins, then in-flight.
fn resolve_payment_status(
    payments: impl Iterator<Item = LndPayment>,
) -> Result<PaymentLookup, LightningError> {
    let mut resolved = PaymentLookup::Unknown;
    for payment in payments {
        match payment.status.as_str() {
            "SUCCEEDED" => {
                let preimage = hex::decode(&payment.payment_preimage)
                    .map_err(|e| LightningError::InvalidResponse(format!("payment_preimage: {e}")))?;
                return Ok(PaymentLookup::Succeeded { preimage });
            }
            "IN_FLIGHT" | "INITIATED" => resolved = PaymentLookup::InFlight,
            "FAILED" if resolved == PaymentLookup::Unknown => {
                resolved = PaymentLookup::Failed {
                    reason: payment.failure_reason,
                };
            }
            _ => {}
        }
    }
    Ok(resolved)
}

/// Split a newline-delimited JSON body into invoice updates.
fn invoice_frames<S, B, E>(body: S) -> impl Stream<Item = Result<Invoice, LightningError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct Frames<S> {
        body: Pin<Box<S>>,
        buf: Vec<u8>,
        done: bool,
    }

    let state = Frames {
        body: Box::pin(body),
        buf: Vec::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                if line.iter().all(|b| b.is_ascii_whitespace()) {
                    continue;
                }
                return Some((parse_frame(&line), st));
            }
            if st.done {
                if st.buf.iter().all(|b| b.is_ascii_whitespace()) {
                    return None;
                }
                let line = std::mem::take(&mut st.buf);
                return Some((parse_frame(&line), st));
            }
            match st.body.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.done = true;
                    st.buf.clear();
                    return Some((Err(LightningError::Transport(e.to_string())), st));
                }
                None => st.done = true,
            }
        }
    })
}

fn parse_frame(line: &[u8]) -> Result<Invoice, LightningError> {
    let frame: StreamFrame = serde_json::from_slice(line)
        .map_err(|e| LightningError::InvalidResponse(format!("subscription frame: {e}")))?;
    match (frame.result, frame.error) {
        (Some(invoice), _) => invoice.try_into(),
        (None, Some(err)) => Err(LightningError::Rpc {
            status: 500,
            message: err.message.or(err.error).unwrap_or_default(),
        }),
        (None, None) => Err(LightningError::InvalidResponse(
            "subscription frame without result".to_string(),
        )),
    }
}
