//! 페이퍼 트레이딩 원장.
//!
//! 시뮬레이션 모드의 상태 전부를 소유합니다: 잔고, 오픈 포지션,
//! 트리거 레코드, 체결 이력. 모든 변경은 호출자가 잡은 단일 쓰기 락
//! 아래에서 하나의 원장 트랜잭션으로 수행됩니다.
//!
//! 회계 모델은 증거금 예약/반환 방식입니다:
//! - 진입: `margin = qty × price / leverage`를 잔고에서 차감
//! - 청산: `margin + realized_pnl`을 잔고에 환입
//! 진입은 잔고 부족 시 거절되므로 잔고가 음수가 되는 경로는
//! 예약 증거금을 초과하는 청산 손실뿐입니다.

use std::collections::HashMap;

use bitunix_core::{
    valuation, GatewayError, OrderReceipt, Position, Side, TpslKind, TpslOrder,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// 설정
// ============================================================================

/// 시뮬레이션 모드 파라미터.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// 시작 잔고 (USDT)
    pub initial_balance: Decimal,
    /// 진입 시 적용할 레버리지
    pub default_leverage: u32,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(25),
            default_leverage: 2,
        }
    }
}

// ============================================================================
// 체결 이력
// ============================================================================

/// 원장에 기록되는 단일 체결.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperFill {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    /// 청산 체결에만 존재
    pub realized_pnl: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
}

/// 계정 요약 스냅샷.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSummary {
    pub balance: Decimal,
    pub open_positions: usize,
    pub total_trades: usize,
    pub realized_pnl: Decimal,
    /// 청산 트레이드 중 이익 비율 (%), 청산 이력이 없으면 0
    pub win_rate: Decimal,
}

// ============================================================================
// 원장
// ============================================================================

/// 페이퍼 트레이딩 원장 본체.
///
/// 동기 메서드만 제공합니다. 호출자(`SimulatedGateway`)가
/// `tokio::sync::RwLock`으로 감싸 직렬화합니다.
#[derive(Debug)]
pub struct PaperEngine {
    balance: Decimal,
    next_position_id: u64,
    positions: HashMap<String, Position>,
    triggers: HashMap<(String, TpslKind), TpslOrder>,
    history: Vec<PaperFill>,
    realized_pnl: Decimal,
    winning_closes: usize,
    total_closes: usize,
    config: SimulatedConfig,
}

impl PaperEngine {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            balance: config.initial_balance,
            next_position_id: 1,
            positions: HashMap::new(),
            triggers: HashMap::new(),
            history: Vec::new(),
            realized_pnl: Decimal::ZERO,
            winning_closes: 0,
            total_closes: 0,
            config,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// 포지션 진입. 증거금 예약에 실패하면 상태를 전혀 바꾸지 않습니다.
    ///
    /// # Errors
    ///
    /// 잔고 < 필요 증거금이면 `GatewayError::InsufficientSimulatedBalance`.
    pub fn open(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderReceipt, GatewayError> {
        let leverage = self.config.default_leverage;
        let margin = valuation::margin(quantity, price, leverage);

        if margin > self.balance {
            return Err(GatewayError::InsufficientSimulatedBalance {
                required: margin,
                available: self.balance,
            });
        }

        // 포지션 id는 단조 증가하며 청산 후에도 재사용하지 않음
        let position_id = format!("SIM-{}", self.next_position_id);
        self.next_position_id += 1;

        self.balance -= margin;
        self.positions.insert(
            position_id.clone(),
            Position::new(symbol, position_id.clone(), side, quantity, price, leverage),
        );
        self.history.push(PaperFill {
            position_id: position_id.clone(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            realized_pnl: None,
            executed_at: Utc::now(),
        });

        info!(%position_id, symbol, %side, %quantity, %price, %margin, "페이퍼 진입");
        Ok(OrderReceipt {
            order_id: position_id,
            symbol: symbol.to_string(),
            side,
            quantity,
        })
    }

    /// 포지션 전량 청산. 증거금과 실현 손익을 잔고에 환입합니다.
    ///
    /// # Errors
    ///
    /// 해당 id의 오픈 포지션이 없으면 `GatewayError::PositionNotFound`.
    /// 동시 청산 경합 시 정확히 한 호출만 성공합니다.
    pub fn close(&mut self, position_id: &str, exit_price: Decimal) -> Result<Decimal, GatewayError> {
        let position = self.positions.remove(position_id).ok_or_else(|| {
            GatewayError::PositionNotFound {
                position_id: position_id.to_string(),
            }
        })?;

        let margin = valuation::margin(position.quantity, position.entry_price, position.leverage);
        let pnl = valuation::unrealized_pnl(
            position.side,
            position.quantity,
            position.entry_price,
            exit_price,
        );

        self.balance += margin + pnl;
        self.realized_pnl += pnl;
        self.total_closes += 1;
        if pnl > Decimal::ZERO {
            self.winning_closes += 1;
        }
        self.triggers
            .retain(|(id, _), _| id != position_id);
        self.history.push(PaperFill {
            position_id: position_id.to_string(),
            symbol: position.symbol.clone(),
            side: position.side.opposite(),
            quantity: position.quantity,
            price: exit_price,
            realized_pnl: Some(pnl),
            executed_at: Utc::now(),
        });

        info!(%position_id, symbol = %position.symbol, %exit_price, %pnl, "페이퍼 청산");
        Ok(pnl)
    }

    /// TP/SL 트리거 기록. 같은 종류가 이미 있으면 교체합니다.
    ///
    /// 트리거는 비활성 레코드입니다. 가격 감시나 자동 체결은
    /// 시뮬레이션하지 않습니다.
    pub fn set_trigger(
        &mut self,
        position_id: &str,
        kind: TpslKind,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError> {
        let position = self.positions.get_mut(position_id).ok_or_else(|| {
            GatewayError::PositionNotFound {
                position_id: position_id.to_string(),
            }
        })?;

        position.attach_trigger(kind, trigger_price);
        self.triggers.insert(
            (position_id.to_string(), kind),
            TpslOrder {
                symbol: position.symbol.clone(),
                position_id: position_id.to_string(),
                trigger_price,
                kind,
            },
        );

        info!(%position_id, %kind, %trigger_price, "페이퍼 트리거 설정");
        Ok(())
    }

    /// 오픈 포지션 목록 (id 기준 정렬된 사본).
    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.position_id.cmp(&b.position_id));
        positions
    }

    pub fn position(&self, position_id: &str) -> Option<&Position> {
        self.positions.get(position_id)
    }

    pub fn history(&self) -> &[PaperFill] {
        &self.history
    }

    /// 계정 요약.
    pub fn summary(&self) -> PaperSummary {
        let win_rate = if self.total_closes == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_closes) / Decimal::from(self.total_closes)
                * Decimal::ONE_HUNDRED
        };
        PaperSummary {
            balance: self.balance,
            open_positions: self.positions.len(),
            total_trades: self.history.len(),
            realized_pnl: self.realized_pnl,
            win_rate,
        }
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PaperEngine {
        PaperEngine::new(SimulatedConfig {
            initial_balance: dec!(1000),
            default_leverage: 10,
        })
    }

    #[test]
    fn test_open_reserves_margin() {
        let mut engine = engine();

        // 10 × 100 / 10 = 증거금 100
        let receipt = engine.open("XRPUSDT", Side::Long, dec!(10), dec!(100)).unwrap();
        assert_eq!(receipt.order_id, "SIM-1");
        assert_eq!(engine.balance(), dec!(900));
        assert_eq!(engine.open_positions().len(), 1);
    }

    #[test]
    fn test_open_rejects_insufficient_balance_without_state_change() {
        let mut engine = PaperEngine::new(SimulatedConfig {
            initial_balance: dec!(25),
            default_leverage: 2,
        });

        // 필요 증거금 100 × 1 / 2 = 50 > 25
        let err = engine.open("SOLUSDT", Side::Long, dec!(1), dec!(100)).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::InsufficientSimulatedBalance { required, available }
                if required == dec!(50) && available == dec!(25)
        ));

        // 거절 시 상태 변화 없음
        assert_eq!(engine.balance(), dec!(25));
        assert!(engine.open_positions().is_empty());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_close_round_trip_credits_margin_plus_pnl() {
        let mut engine = engine();

        let receipt = engine.open("XRPUSDT", Side::Long, dec!(10), dec!(100)).unwrap();
        assert_eq!(engine.balance(), dec!(900));

        // 110에 청산: pnl = 10 × (110 − 100) = 100, 환입 = 100 + 100
        let pnl = engine.close(&receipt.order_id, dec!(110)).unwrap();
        assert_eq!(pnl, dec!(100));
        assert_eq!(engine.balance(), dec!(1100));
        assert!(engine.open_positions().is_empty());
    }

    #[test]
    fn test_close_unknown_position() {
        let mut engine = engine();
        let err = engine.close("SIM-99", dec!(1)).unwrap_err();
        assert!(matches!(err, GatewayError::PositionNotFound { .. }));
    }

    #[test]
    fn test_double_close_fails_second_time() {
        let mut engine = engine();
        let receipt = engine.open("XRPUSDT", Side::Long, dec!(10), dec!(100)).unwrap();

        engine.close(&receipt.order_id, dec!(100)).unwrap();
        let err = engine.close(&receipt.order_id, dec!(100)).unwrap_err();
        assert!(matches!(err, GatewayError::PositionNotFound { .. }));
    }

    #[test]
    fn test_position_ids_monotonic_never_reused() {
        let mut engine = engine();

        let first = engine.open("XRPUSDT", Side::Long, dec!(1), dec!(10)).unwrap();
        engine.close(&first.order_id, dec!(10)).unwrap();
        let second = engine.open("XRPUSDT", Side::Long, dec!(1), dec!(10)).unwrap();

        assert_eq!(first.order_id, "SIM-1");
        assert_eq!(second.order_id, "SIM-2");
    }

    #[test]
    fn test_triggers_are_inert_records() {
        let mut engine = engine();
        let receipt = engine.open("XRPUSDT", Side::Long, dec!(10), dec!(100)).unwrap();

        engine
            .set_trigger(&receipt.order_id, TpslKind::TakeProfit, dec!(102))
            .unwrap();
        // 재설정은 교체
        engine
            .set_trigger(&receipt.order_id, TpslKind::TakeProfit, dec!(105))
            .unwrap();

        let positions = engine.open_positions();
        assert_eq!(positions[0].take_profit, Some(dec!(105)));
        // 트리거 가격을 넘는 시세가 와도 자동 청산되지 않음 (원장은 비활성)
        assert_eq!(engine.open_positions().len(), 1);
    }

    #[test]
    fn test_trigger_on_missing_position() {
        let mut engine = engine();
        let err = engine
            .set_trigger("SIM-1", TpslKind::StopLoss, dec!(1))
            .unwrap_err();
        assert!(matches!(err, GatewayError::PositionNotFound { .. }));
    }

    #[test]
    fn test_summary_reflects_realized_pnl() {
        let mut engine = engine();

        let a = engine.open("XRPUSDT", Side::Long, dec!(10), dec!(100)).unwrap();
        engine.close(&a.order_id, dec!(110)).unwrap();
        let b = engine.open("XRPUSDT", Side::Short, dec!(10), dec!(100)).unwrap();
        engine.close(&b.order_id, dec!(105)).unwrap();

        let summary = engine.summary();
        // +100, −50
        assert_eq!(summary.realized_pnl, dec!(50));
        assert_eq!(summary.total_trades, 4);
        assert_eq!(summary.open_positions, 0);
        assert_eq!(summary.win_rate, dec!(50));
    }

    #[test]
    fn test_balance_can_go_negative_only_through_closing_loss() {
        let mut engine = PaperEngine::new(SimulatedConfig {
            initial_balance: dec!(10),
            default_leverage: 10,
        });

        // 증거금 10 예약 (잔고 0)
        let receipt = engine.open("XRPUSDT", Side::Long, dec!(1), dec!(100)).unwrap();
        assert_eq!(engine.balance(), dec!(0));

        // 손실 20이 증거금 10을 초과 → 환입 10 − 20 = −10
        engine.close(&receipt.order_id, dec!(80)).unwrap();
        assert_eq!(engine.balance(), dec!(-10));
    }
}
