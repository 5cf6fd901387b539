//! 실행 게이트웨이 추상화.
//!
//! 시뮬레이션/라이브 두 변형이 공유하는 단일 능력 집합입니다.
//! 모드 플래그는 게이트웨이 생성 시점에 한 번만 소비되며,
//! 호출자 코드에는 런타임 분기가 흩어지지 않습니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use super::position::{MarketQuote, OrderReceipt, Position, Side};
use super::token::TokenConfig;
use crate::valuation::ValuationError;

// =============================================================================
// 에러 타입
// =============================================================================

/// 신뢰할 수 없는 업스트림 응답의 분류.
///
/// 거래소가 간헐적으로 반환하는 세 가지 오류 클래스입니다.
/// 게이트웨이 경계에서 디코딩되며, 내부 코드는 원문 문자열을 검사하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreliableKind {
    /// 서명 오류 (간헐적 "Signature Error")
    Signature,
    /// 일반 시스템 오류 (간헐적 "System error")
    SystemError,
    /// 네트워크/전송 오류
    Network,
}

impl std::fmt::Display for UnreliableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnreliableKind::Signature => write!(f, "signature"),
            UnreliableKind::SystemError => write!(f, "system"),
            UnreliableKind::Network => write!(f, "network"),
        }
    }
}

/// 게이트웨이 에러.
///
/// 검증 에러(`UnknownSymbol`, `BelowMinimumQuantity`, `PositionNotFound`)는
/// 네트워크 호출 전에 발생하며 즉시 표면화됩니다.
/// 업스트림 에러는 분류만 부착해 호출자에게 전달하고, 이 코어는 재시도하지 않습니다.
/// 어떤 에러도 프로세스에 치명적이지 않으며 단일 인텐트 범위로 한정됩니다.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 지원하지 않는 심볼
    #[error("지원하지 않는 심볼: {symbol}")]
    UnknownSymbol {
        /// 요청된 심볼
        symbol: String,
    },

    /// 최소 주문 수량 미달 (거래소 호출 없이 로컬에서 거절)
    #[error("최소 주문 수량 미달: {symbol} 수량 {quantity} < 최소 {minimum}")]
    BelowMinimumQuantity {
        /// 거래 심볼
        symbol: String,
        /// 요청 수량
        quantity: Decimal,
        /// 토큰 최소 수량
        minimum: Decimal,
    },

    /// 포지션 없음 (잘못되었거나 이미 청산된 positionId)
    #[error("포지션 없음: {position_id}")]
    PositionNotFound {
        /// 요청된 포지션 식별자
        position_id: String,
    },

    /// 시뮬레이션 잔고 부족 (진입 거절, 잔고는 음수가 되지 않음)
    #[error("시뮬레이션 잔고 부족: 필요 {required}, 가용 {available}")]
    InsufficientSimulatedBalance {
        /// 필요 증거금
        required: Decimal,
        /// 가용 잔고
        available: Decimal,
    },

    /// 업스트림이 알려진 불안정 클래스의 오류를 반환
    #[error("업스트림 불안정 ({kind}): {detail}")]
    UpstreamUnreliable {
        /// 오류 분류
        kind: UnreliableKind,
        /// 거래소 원문 메시지 (로깅용)
        detail: String,
    },

    /// 업스트림이 파라미터를 명시적으로 거절
    #[error("업스트림 거절 (code {code}): {message}")]
    UpstreamRejected {
        /// 거래소 응답 코드
        code: i64,
        /// 거래소 메시지
        message: String,
    },

    /// 평가 불가 (0 시세, margin 0 등)
    #[error(transparent)]
    Valuation(#[from] ValuationError),
}

impl GatewayError {
    /// 네트워크 호출 전에 잡히는 검증 에러 여부.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GatewayError::UnknownSymbol { .. }
                | GatewayError::BelowMinimumQuantity { .. }
                | GatewayError::PositionNotFound { .. }
                | GatewayError::Valuation(_)
        )
    }
}

// =============================================================================
// ExecutionGateway Trait
// =============================================================================

/// 실행 게이트웨이 trait.
///
/// 시뮬레이션 변형은 내부 페이퍼 원장에 위임하고,
/// 라이브 변형은 검증된 엔드포인트에 1:1 서명 요청을 보냅니다.
/// 두 변형 모두 최소 수량/존재 여부 검증을 동일하게 수행하므로
/// 실제 정산을 제외하면 관찰 가능한 동작이 동일합니다.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// 시장가 주문으로 포지션 진입.
    ///
    /// 수량이 토큰 최소 수량 미만이면 거래소에 접촉하지 않고
    /// `BelowMinimumQuantity`를 반환합니다.
    ///
    /// # Errors
    ///
    /// - `GatewayError::UnknownSymbol`: 미지원 심볼
    /// - `GatewayError::BelowMinimumQuantity`: 최소 수량 미달
    /// - `GatewayError::UpstreamUnreliable` / `UpstreamRejected`: 거래소 오류
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderReceipt, GatewayError>;

    /// 현재 오픈 포지션 목록 조회.
    ///
    /// # Returns
    ///
    /// 포지션 목록. 포지션이 없으면 에러가 아닌 빈 벡터를 반환합니다.
    async fn pending_positions(&self) -> Result<Vec<Position>, GatewayError>;

    /// 현재가 조회. 평가 요청마다 새로 호출해야 합니다.
    async fn ticker_price(&self, symbol: &str) -> Result<MarketQuote, GatewayError>;

    /// 포지션에 익절 트리거 설정. 기존 TP가 있으면 교체됩니다.
    ///
    /// # Errors
    ///
    /// - `GatewayError::PositionNotFound`: 해당 positionId의 오픈 포지션 없음
    async fn set_take_profit(
        &self,
        symbol: &str,
        position_id: &str,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError>;

    /// 포지션에 손절 트리거 설정. 기존 SL이 있으면 교체됩니다.
    async fn set_stop_loss(
        &self,
        symbol: &str,
        position_id: &str,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError>;

    /// 포지션 전량 청산. 부분 청산은 지원하지 않습니다.
    async fn close_position(&self, symbol: &str, position_id: &str) -> Result<(), GatewayError>;

    /// 토큰 거래 파라미터 조회.
    async fn token_info(&self, symbol: &str) -> Result<TokenConfig, GatewayError>;

    /// 게이트웨이 이름 (로깅/디버깅용).
    fn gateway_name(&self) -> &str;
}

// =============================================================================
// 테스트
// =============================================================================
