//! Bitunix 선물 REST 클라이언트.
//!
//! 검증된 엔드포인트만 노출합니다. 계정 조회, 심볼별 포지션 조회,
//! flash close, close_all_position 등 간헐적으로 실패하는 엔드포인트는
//! 호출 표면에서 제외했습니다.
//!
//! 인증은 2단계 SHA256 서명입니다:
//! 1. digest = SHA256(nonce + timestamp + api_key + query_string + body)
//! 2. sign = SHA256(digest + secret_key)

use std::time::{SystemTime, UNIX_EPOCH};

use bitunix_core::{GatewayError, Side, UnreliableKind};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "https://fapi.bitunix.com";

// ============================================================================
// 설정
// ============================================================================

#[derive(Clone)]
pub struct BitunixConfig {
    pub api_key: String,
    pub secret_key: SecretString,
}

impl std::fmt::Debug for BitunixConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitunixConfig")
            .field("api_key", &"***")
            .field("secret_key", &"***")
            .finish()
    }
}

impl BitunixConfig {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: SecretString::from(secret_key.into()),
        }
    }
}

// ============================================================================
// 서명 헬퍼
// ============================================================================

/// 하이픈 제거 UUIDv4 nonce.
fn generate_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 현재 unix 밀리초 타임스탬프.
fn timestamp_ms() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    millis.to_string()
}

/// 2단계 SHA256 서명 계산. 고정 입력에 대해 결정적입니다.
fn compute_signature(
    nonce: &str,
    timestamp: &str,
    api_key: &str,
    query_string: &str,
    body: &str,
    secret_key: &str,
) -> String {
    let digest_input = format!("{nonce}{timestamp}{api_key}{query_string}{body}");
    let digest = hex::encode(Sha256::digest(digest_input.as_bytes()));

    let sign_input = format!("{digest}{secret_key}");
    hex::encode(Sha256::digest(sign_input.as_bytes()))
}

// ============================================================================
// API 응답 타입
// ============================================================================

/// 공통 응답 봉투 `{code, data, msg}`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    pub data: Option<T>,
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderData {
    pub order_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// 거래소가 반환하는 포지션 행. 수치 필드는 문자열로 내려옵니다.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub position_id: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    pub side: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_open_price: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default)]
    pub margin_mode: Option<String>,
    #[serde(default)]
    pub margin_coin: Option<String>,
}

fn default_leverage() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
}

/// tickers 엔드포인트는 단일 객체/리스트 두 형태를 모두 반환한 이력이 있어
/// 양쪽 다 수용합니다.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TickerPayload {
    Many(Vec<RawTicker>),
    One(RawTicker),
}

impl TickerPayload {
    fn into_vec(self) -> Vec<RawTicker> {
        match self {
            TickerPayload::Many(v) => v,
            TickerPayload::One(t) => vec![t],
        }
    }
}

// ============================================================================
// 에러 분류
// ============================================================================

/// 0이 아닌 응답 코드를 게이트웨이 에러로 분류.
///
/// 관측된 불안정 클래스 세 가지는 `UpstreamUnreliable`로,
/// 그 외의 코드는 명시적 거절(`UpstreamRejected`)로 간주합니다.
/// 이 경계를 지나면 내부 코드는 원문 문자열을 검사하지 않습니다.
fn classify_failure(code: i64, msg: Option<String>) -> GatewayError {
    let detail = msg.unwrap_or_else(|| "Unknown error".to_string());
    match code {
        10007 => GatewayError::UpstreamUnreliable {
            kind: UnreliableKind::Signature,
            detail,
        },
        2 => GatewayError::UpstreamUnreliable {
            kind: UnreliableKind::SystemError,
            detail,
        },
        1 => GatewayError::UpstreamUnreliable {
            kind: UnreliableKind::Network,
            detail,
        },
        code => GatewayError::UpstreamRejected {
            code,
            message: detail,
        },
    }
}

fn network_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::UpstreamUnreliable {
        kind: UnreliableKind::Network,
        detail: err.to_string(),
    }
}

// ============================================================================
// Bitunix 클라이언트
// ============================================================================

pub struct BitunixClient {
    client: Client,
    config: BitunixConfig,
    base_url: String,
}

impl BitunixClient {
    pub fn new(config: BitunixConfig) -> Self {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    /// 테스트용 base URL 오버라이드.
    pub fn with_base_url(config: BitunixConfig, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            config,
            base_url: base_url.into(),
        }
    }

    fn auth_headers(&self, query_string: &str, body: &str) -> [(&'static str, String); 4] {
        let nonce = generate_nonce();
        let timestamp = timestamp_ms();
        let sign = compute_signature(
            &nonce,
            &timestamp,
            &self.config.api_key,
            query_string,
            body,
            self.config.secret_key.expose_secret(),
        );
        [
            ("api-key", self.config.api_key.clone()),
            ("nonce", nonce),
            ("timestamp", timestamp),
            ("sign", sign),
        ]
    }

    /// 서명된 POST. body는 키 정렬 compact JSON이어야 서명이 맞습니다.
    async fn signed_post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiEnvelope<T>, GatewayError> {
        // serde_json::Map은 키 정렬 순서로 직렬화되므로 그대로 서명 입력으로 사용
        let body_text = serde_json::to_string(body).map_err(network_error)?;
        debug!(path, body = %body_text, "bitunix POST");

        let mut builder = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json");
        for (name, value) in self.auth_headers("", &body_text) {
            builder = builder.header(name, value);
        }

        let response = builder.body(body_text).send().await.map_err(network_error)?;
        self.decode(response).await
    }

    /// 서명된 GET (쿼리 없는 엔드포인트 전용).
    async fn signed_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<ApiEnvelope<T>, GatewayError> {
        debug!(path, "bitunix GET");
        let mut builder = self.client.get(format!("{}{}", self.base_url, path));
        for (name, value) in self.auth_headers("", "") {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(network_error)?;
        self.decode(response).await
    }

    /// 공개 GET (시세 엔드포인트는 서명이 필요 없음).
    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiEnvelope<T>, GatewayError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(network_error)?;
        self.decode(response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<T>, GatewayError> {
        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(network_error(format!("HTTP {status}: {text}")));
        }
        serde_json::from_str::<ApiEnvelope<T>>(&text)
            .map_err(|e| network_error(format!("응답 파싱 실패: {e}. Body: {text}")))
    }

    /// 봉투를 풀고 실패 코드를 분류.
    fn unwrap_data<T>(envelope: ApiEnvelope<T>) -> Result<Option<T>, GatewayError> {
        if envelope.code != 0 {
            let err = classify_failure(envelope.code, envelope.msg);
            warn!(error = %err, "bitunix API 오류");
            return Err(err);
        }
        Ok(envelope.data)
    }
}

// ============================================================================
// 검증된 호출 표면
// ============================================================================

impl BitunixClient {
    /// 시장가 진입 주문 (POST /api/v1/futures/trade/place_order).
    pub async fn place_open_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<PlaceOrderData, GatewayError> {
        let body = serde_json::json!({
            "symbol": symbol,
            "side": side.as_wire(),
            "orderType": "MARKET",
            "qty": quantity.to_string(),
            "tradeSide": "OPEN",
        });

        let envelope = self.signed_post::<PlaceOrderData>("/api/v1/futures/trade/place_order", &body).await?;
        Self::unwrap_data(envelope)?.ok_or_else(|| {
            network_error("place_order 응답에 data 없음")
        })
    }

    /// 시장가 청산 주문. `tradeSide=CLOSE`에는 positionId가 필수입니다.
    pub async fn place_close_order(
        &self,
        symbol: &str,
        position_id: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<PlaceOrderData, GatewayError> {
        let body = serde_json::json!({
            "symbol": symbol,
            "qty": quantity.to_string(),
            "side": side.as_wire(),
            "tradeSide": "CLOSE",
            "positionId": position_id,
            "orderType": "MARKET",
            "reduceOnly": true,
        });

        let envelope = self.signed_post::<PlaceOrderData>("/api/v1/futures/trade/place_order", &body).await?;
        Self::unwrap_data(envelope)?.ok_or_else(|| {
            network_error("place_order 응답에 data 없음")
        })
    }

    /// 오픈 포지션 목록 (GET /api/v1/futures/position/get_pending_positions).
    ///
    /// 포지션이 없으면 빈 벡터를 반환합니다.
    pub async fn pending_positions(&self) -> Result<Vec<RawPosition>, GatewayError> {
        let envelope = self
            .signed_get::<Vec<RawPosition>>("/api/v1/futures/position/get_pending_positions")
            .await?;
        Ok(Self::unwrap_data(envelope)?.unwrap_or_default())
    }

    /// 심볼 시세 (GET /api/v1/futures/market/tickers?symbol=).
    pub async fn tickers(&self, symbol: &str) -> Result<Vec<RawTicker>, GatewayError> {
        let envelope = self
            .public_get::<TickerPayload>("/api/v1/futures/market/tickers", &[("symbol", symbol)])
            .await?;
        Ok(Self::unwrap_data(envelope)?
            .map(TickerPayload::into_vec)
            .unwrap_or_default())
    }

    /// 포지션 TP/SL 설정 (POST /api/v1/futures/tpsl/position/place_order).
    ///
    /// TP/SL 중 설정할 쪽만 Some으로 전달합니다. 트리거 기준은 LAST_PRICE.
    pub async fn place_position_tpsl(
        &self,
        symbol: &str,
        position_id: &str,
        tp_price: Option<Decimal>,
        sl_price: Option<Decimal>,
    ) -> Result<(), GatewayError> {
        let mut body = serde_json::json!({
            "symbol": symbol,
            "positionId": position_id,
        });
        if let Some(tp) = tp_price {
            body["tpPrice"] = serde_json::Value::String(tp.to_string());
            body["tpStopType"] = serde_json::Value::String("LAST_PRICE".to_string());
        }
        if let Some(sl) = sl_price {
            body["slPrice"] = serde_json::Value::String(sl.to_string());
            body["slStopType"] = serde_json::Value::String("LAST_PRICE".to_string());
        }

        let envelope = self
            .signed_post::<serde_json::Value>("/api/v1/futures/tpsl/position/place_order", &body)
            .await?;
        Self::unwrap_data(envelope)?;
        Ok(())
    }
}

// ============================================================================
// 테스트
// ============================================================================
