//! 거래소 중립 포지션/시세 타입 정의.
//!
//! 라이브 거래소와 시뮬레이션 원장의 데이터를 통일된 형식으로 표현합니다.
//! 거래소별 serde 타입은 커넥터 내부에 유지되며,
//! 변환을 통해 이 중립 타입으로 바뀝니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::valuation::PositionMetrics;

// =============================================================================
// 포지션 방향
// =============================================================================

/// 포지션 방향.
///
/// 거래소 와이어 포맷은 "BUY"/"SELL"이므로 serde rename으로 맞춥니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// 롱 (매수 진입)
    #[serde(rename = "BUY")]
    Long,
    /// 숏 (매도 진입)
    #[serde(rename = "SELL")]
    Short,
}

impl Side {
    /// 청산 시 제출하는 반대 방향.
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// 거래소 와이어 문자열.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Side::Long => "BUY",
            Side::Short => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "Long"),
            Side::Short => write!(f, "Short"),
        }
    }
}

// =============================================================================
// 포지션
// =============================================================================

/// 오픈 포지션.
///
/// `position_id`는 거래소(또는 시뮬레이터)가 부여하는 불투명 식별자로,
/// TP/SL 설정과 청산에 반드시 필요합니다.
/// 이 코어의 액션 집합은 전량 진입/전량 청산만 다루므로
/// 수량/진입가는 생성 후 변하지 않으며, TP/SL 부착만 갱신됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 거래 심볼 (예: "XRPUSDT")
    pub symbol: String,
    /// 거래소 부여 포지션 식별자
    pub position_id: String,
    /// 포지션 방향
    pub side: Side,
    /// 보유 수량
    pub quantity: Decimal,
    /// 평균 진입가
    pub entry_price: Decimal,
    /// 레버리지 (1 이상)
    pub leverage: u32,
    /// 마진 모드 (거래소 값 그대로 전달, 해석하지 않음)
    pub margin_mode: String,
    /// 부착된 익절 트리거 가격
    pub take_profit: Option<Decimal>,
    /// 부착된 손절 트리거 가격
    pub stop_loss: Option<Decimal>,
}

impl Position {
    /// 새 포지션 생성. TP/SL 없이 시작합니다.
    pub fn new(
        symbol: impl Into<String>,
        position_id: impl Into<String>,
        side: Side,
        quantity: Decimal,
        entry_price: Decimal,
        leverage: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            position_id: position_id.into(),
            side,
            quantity,
            entry_price,
            leverage,
            margin_mode: "ISOLATION".to_string(),
            take_profit: None,
            stop_loss: None,
        }
    }

    /// 트리거 부착. 같은 종류가 이미 있으면 가격을 교체합니다.
    pub fn attach_trigger(&mut self, kind: TpslKind, trigger_price: Decimal) {
        match kind {
            TpslKind::TakeProfit => self.take_profit = Some(trigger_price),
            TpslKind::StopLoss => self.stop_loss = Some(trigger_price),
        }
    }
}

// =============================================================================
// 시세
// =============================================================================

/// 단일 심볼의 최신 체결가 스냅샷.
///
/// 마진/PnL은 항상 현재가를 반영해야 하므로
/// 평가 요청마다 새로 조회하며, 요청 간 캐시하지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    /// 거래 심볼
    pub symbol: String,
    /// 최근 체결가 (마크 가격으로 사용)
    pub last_price: Decimal,
    /// 조회 시각
    pub fetched_at: DateTime<Utc>,
}

impl MarketQuote {
    /// 새 시세 스냅샷 생성 (조회 시각은 현재).
    pub fn now(symbol: impl Into<String>, last_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            last_price,
            fetched_at: Utc::now(),
        }
    }
}

// =============================================================================
// TP/SL 트리거
// =============================================================================

/// 트리거 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TpslKind {
    /// 익절 (Take Profit)
    TakeProfit,
    /// 손절 (Stop Loss)
    StopLoss,
}

impl std::fmt::Display for TpslKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TpslKind::TakeProfit => write!(f, "TP"),
            TpslKind::StopLoss => write!(f, "SL"),
        }
    }
}

/// 포지션에 부착된 TP/SL 트리거 레코드.
///
/// 포지션당 종류별로 최대 1개만 활성화되며,
/// 같은 종류를 다시 설정하면 기존 트리거 가격이 교체됩니다.
/// 트리거 감시 자체는 이 코어의 범위 밖입니다 (거래소/GUI가 담당).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpslOrder {
    /// 거래 심볼
    pub symbol: String,
    /// 대상 포지션 식별자
    pub position_id: String,
    /// 트리거 가격
    pub trigger_price: Decimal,
    /// 트리거 종류
    pub kind: TpslKind,
}

// =============================================================================
// 주문 응답
// =============================================================================

/// 시장가 주문 접수 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    /// 거래소/시뮬레이터 부여 주문 번호
    pub order_id: String,
    /// 거래 심볼
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 수량
    pub quantity: Decimal,
}

// =============================================================================
// 평가 결과가 붙은 포지션
// =============================================================================

/// 프레젠테이션 레이어로 반환되는 포지션 레코드.
///
/// 파생 지표는 항상 재계산되며 저장되지 않습니다 (staleness 방지).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedPosition {
    /// 원본 포지션
    pub position: Position,
    /// 평가에 사용한 마크 가격
    pub mark_price: Decimal,
    /// 파생 지표 (마진, PnL, ROI, 청산가 등)
    pub metrics: PositionMetrics,
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn test_side_wire_format() {
        assert_eq!(Side::Long.as_wire(), "BUY");
        assert_eq!(Side::Short.as_wire(), "SELL");

        // serde도 와이어 포맷을 따라야 함
        let json = serde_json::to_string(&Side::Long).unwrap();
        assert_eq!(json, "\"BUY\"");
        let side: Side = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(side, Side::Short);
    }

    #[test]
    fn test_attach_trigger_replaces_prior() {
        let mut pos = Position::new("XRPUSDT", "1001", Side::Long, dec!(10), dec!(0.75), 2);
        assert!(pos.take_profit.is_none());

        pos.attach_trigger(TpslKind::TakeProfit, dec!(0.80));
        pos.attach_trigger(TpslKind::StopLoss, dec!(0.70));
        // TP와 SL은 독립적으로 공존
        assert_eq!(pos.take_profit, Some(dec!(0.80)));
        assert_eq!(pos.stop_loss, Some(dec!(0.70)));

        // TP 재설정 시 기존 가격 교체, SL은 유지
        pos.attach_trigger(TpslKind::TakeProfit, dec!(0.85));
        assert_eq!(pos.take_profit, Some(dec!(0.85)));
        assert_eq!(pos.stop_loss, Some(dec!(0.70)));

        // 수량/진입가는 불변
        assert_eq!(pos.quantity, dec!(10));
        assert_eq!(pos.entry_price, dec!(0.75));
    }
}
