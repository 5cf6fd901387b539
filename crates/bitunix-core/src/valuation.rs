//! 포지션 평가 엔진.
//!
//! `(Position, MarketQuote, TokenConfig)`로부터 마진, PnL, ROI, 청산가를
//! 계산하는 순수 함수 집합입니다. 상태가 없고 결정적이며,
//! 시뮬레이션과 라이브 경로가 동일한 공식을 사용합니다.
//!
//! 모든 계산은 `rust_decimal::Decimal`로 수행합니다.
//! 이진 부동소수점 반올림 오차가 표시 금액에 새어 나가면 안 됩니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::position::{EnrichedPosition, MarketQuote, Position, Side};
use crate::domain::token::TokenConfig;

// =============================================================================
// 에러 타입
// =============================================================================

/// 평가 에러.
#[derive(Debug, Clone, Error)]
pub enum ValuationError {
    /// 0 또는 누락된 시세 (0으로 나누지 않고 거절)
    #[error("유효하지 않은 시세: {symbol} 가격 0")]
    InvalidQuote {
        /// 거래 심볼
        symbol: String,
    },

    /// 마진이 0이라 ROI 정의 불가
    #[error("ROI 정의 불가: {symbol} 마진 0")]
    UndefinedRoi {
        /// 거래 심볼
        symbol: String,
    },
}

// =============================================================================
// 파생 지표
// =============================================================================

/// 포지션 파생 지표.
///
/// 항상 요청 시점에 재계산되며 저장되지 않습니다.
/// 저장하면 시세 변동에 따라 즉시 stale해지기 때문입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionMetrics {
    /// 증거금: quantity × entry_price / leverage
    pub margin: Decimal,
    /// 증거금률: margin / (quantity × mark_price)
    pub margin_rate: Decimal,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
    /// 증거금 대비 수익률 (%)
    pub roi: Decimal,
    /// 추정 청산가
    pub liquidation_price: Decimal,
}

// =============================================================================
// 개별 공식
// =============================================================================

/// 증거금 계산: `quantity × entry_price / leverage`.
pub fn margin(quantity: Decimal, entry_price: Decimal, leverage: u32) -> Decimal {
    quantity * entry_price / Decimal::from(leverage.max(1))
}

/// 증거금률 계산: 현재 명목가치 중 증거금이 차지하는 비율.
///
/// # Errors
///
/// `mark_price`가 0이면 `ValuationError::InvalidQuote`.
pub fn margin_rate(
    symbol: &str,
    margin: Decimal,
    quantity: Decimal,
    mark_price: Decimal,
) -> Result<Decimal, ValuationError> {
    let notional = quantity * mark_price;
    if notional.is_zero() {
        return Err(ValuationError::InvalidQuote {
            symbol: symbol.to_string(),
        });
    }
    Ok(margin / notional)
}

/// 미실현 손익 계산.
///
/// 롱: `quantity × (mark − entry)`, 숏: `quantity × (entry − mark)`.
pub fn unrealized_pnl(
    side: Side,
    quantity: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
) -> Decimal {
    match side {
        Side::Long => quantity * (mark_price - entry_price),
        Side::Short => quantity * (entry_price - mark_price),
    }
}

/// ROI 계산: `unrealized_pnl / margin × 100`.
///
/// # Errors
///
/// 마진이 0이면 `ValuationError::UndefinedRoi`.
pub fn roi(
    symbol: &str,
    unrealized_pnl: Decimal,
    margin: Decimal,
) -> Result<Decimal, ValuationError> {
    if margin.is_zero() {
        return Err(ValuationError::UndefinedRoi {
            symbol: symbol.to_string(),
        });
    }
    Ok(unrealized_pnl / margin * Decimal::ONE_HUNDRED)
}

/// 추정 청산가 계산.
///
/// 롱: `entry × (1 − 1/leverage + m)`, 숏: `entry × (1 + 1/leverage − m)`.
/// `m`은 토큰의 유지증거금률.
///
/// 수수료와 펀딩비를 무시한 근사치입니다. 거래소 화면의 표시 값과
/// 일치하는 것이 계약이므로 여기에 항을 추가하면 안 됩니다.
pub fn liquidation_price(
    side: Side,
    entry_price: Decimal,
    leverage: u32,
    maintenance_margin_rate: Decimal,
) -> Decimal {
    let inverse_leverage = Decimal::ONE / Decimal::from(leverage.max(1));
    match side {
        Side::Long => entry_price * (Decimal::ONE - inverse_leverage + maintenance_margin_rate),
        Side::Short => entry_price * (Decimal::ONE + inverse_leverage - maintenance_margin_rate),
    }
}

// =============================================================================
// 종합 평가
// =============================================================================

/// 포지션의 모든 파생 지표를 한 번에 계산.
///
/// # Errors
///
/// - `ValuationError::InvalidQuote`: 시세 가격 0
/// - `ValuationError::UndefinedRoi`: 마진 0
pub fn evaluate(
    position: &Position,
    quote: &MarketQuote,
    token: &TokenConfig,
) -> Result<PositionMetrics, ValuationError> {
    if quote.last_price.is_zero() {
        return Err(ValuationError::InvalidQuote {
            symbol: position.symbol.clone(),
        });
    }

    let margin = margin(position.quantity, position.entry_price, position.leverage);
    let margin_rate = margin_rate(&position.symbol, margin, position.quantity, quote.last_price)?;
    let unrealized_pnl = unrealized_pnl(
        position.side,
        position.quantity,
        position.entry_price,
        quote.last_price,
    );
    let roi = roi(&position.symbol, unrealized_pnl, margin)?;
    let liquidation_price = liquidation_price(
        position.side,
        position.entry_price,
        position.leverage,
        token.maintenance_margin_rate,
    );

    Ok(PositionMetrics {
        margin,
        margin_rate,
        unrealized_pnl,
        roi,
        liquidation_price,
    })
}

/// 포지션에 시세와 파생 지표를 붙여 프레젠테이션용 레코드 생성.
pub fn enrich(
    position: Position,
    quote: &MarketQuote,
    token: &TokenConfig,
) -> Result<EnrichedPosition, ValuationError> {
    let metrics = evaluate(&position, quote, token)?;
    Ok(EnrichedPosition {
        position,
        mark_price: quote.last_price,
        metrics,
    })
}

// =============================================================================
// 테스트
// =============================================================================
