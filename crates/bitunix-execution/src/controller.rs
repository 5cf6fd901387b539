//! 인텐트 → 게이트웨이 호출 변환.
//!
//! 모든 인텐트는 성공 또는 첫 분류 에러에서 종결됩니다.
//! 재시도하지 않으며, 실패한 인텐트는 원장 상태를 건드리지 않습니다.

use std::sync::Arc;

use bitunix_core::{
    valuation, EnrichedPosition, ExecutionGateway, GatewayError, MarketQuote, OrderReceipt,
    Position, Side, TokenConfig, TokenConfigManager, TpslKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// TP/SL 트리거 오프셋 (현재가 대비 ±2%).
const TRIGGER_OFFSET: Decimal = dec!(0.02);

// ============================================================================
// 인텐트 / 결과
// ============================================================================

/// 운영자 인텐트.
///
/// 트리거 가격은 인텐트에 포함되지 않습니다. 컨트롤러가 항상
/// 신선한 시세에서 계산하며, 호출자 지정 가격은 받지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TradeIntent {
    Open {
        symbol: String,
        side: Side,
        quantity: Decimal,
    },
    SetTakeProfit {
        symbol: String,
        position_id: String,
    },
    SetStopLoss {
        symbol: String,
        position_id: String,
    },
    Close {
        symbol: String,
        position_id: String,
    },
    Refresh,
}

/// 인텐트 처리 결과.
#[derive(Debug, Clone)]
pub enum IntentOutcome {
    Placed(OrderReceipt),
    TriggerSet {
        position_id: String,
        kind: TpslKind,
        trigger_price: Decimal,
    },
    Closed {
        position_id: String,
    },
    Positions(Vec<EnrichedPosition>),
}

// ============================================================================
// 트리거 가격 계산
// ============================================================================

/// 신선한 마크 가격에서 ±2% 트리거 계산 후 토큰 정밀도로 반올림.
///
/// TP는 이익 방향(롱 +2% / 숏 −2%), SL은 손실 방향(롱 −2% / 숏 +2%).
fn compute_trigger(side: Side, kind: TpslKind, mark_price: Decimal, token: &TokenConfig) -> Decimal {
    let offset = match (kind, side) {
        (TpslKind::TakeProfit, Side::Long) | (TpslKind::StopLoss, Side::Short) => TRIGGER_OFFSET,
        (TpslKind::TakeProfit, Side::Short) | (TpslKind::StopLoss, Side::Long) => -TRIGGER_OFFSET,
    };
    token.round_price(mark_price * (Decimal::ONE + offset))
}

// ============================================================================
// 컨트롤러
// ============================================================================

pub struct PositionLifecycleController {
    gateway: Arc<dyn ExecutionGateway>,
    tokens: Arc<TokenConfigManager>,
}

impl PositionLifecycleController {
    pub fn new(gateway: Arc<dyn ExecutionGateway>, tokens: Arc<TokenConfigManager>) -> Self {
        Self { gateway, tokens }
    }

    /// 인텐트 하나를 종결까지 처리.
    pub async fn handle(&self, intent: TradeIntent) -> Result<IntentOutcome, GatewayError> {
        debug!(?intent, gateway = self.gateway.gateway_name(), "인텐트 처리");
        match intent {
            TradeIntent::Open {
                symbol,
                side,
                quantity,
            } => self.open(&symbol, side, quantity).await,
            TradeIntent::SetTakeProfit {
                symbol,
                position_id,
            } => {
                self.set_trigger(&symbol, &position_id, TpslKind::TakeProfit)
                    .await
            }
            TradeIntent::SetStopLoss {
                symbol,
                position_id,
            } => {
                self.set_trigger(&symbol, &position_id, TpslKind::StopLoss)
                    .await
            }
            TradeIntent::Close {
                symbol,
                position_id,
            } => self.close(&symbol, &position_id).await,
            TradeIntent::Refresh => self.refresh().await,
        }
    }

    /// 진입: 심볼/최소 수량 검증 후 시장가 주문 한 건.
    ///
    /// 주문 접수 후 추가 상태 변경은 없습니다. 포지션은 다음
    /// Refresh에서 pull로 나타납니다.
    async fn open(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<IntentOutcome, GatewayError> {
        let token = self.tokens.get(symbol)?;
        if quantity < token.min_quantity {
            return Err(GatewayError::BelowMinimumQuantity {
                symbol: token.trading_symbol.clone(),
                quantity,
                minimum: token.min_quantity,
            });
        }

        let receipt = self
            .gateway
            .place_market_order(symbol, side, quantity)
            .await?;
        info!(symbol = %receipt.symbol, %side, quantity = %receipt.quantity, order_id = %receipt.order_id, "진입 접수");
        Ok(IntentOutcome::Placed(receipt))
    }

    /// TP/SL 설정: 포지션 위치 확인 → 신선한 시세 → ±2% 계산 → 게이트웨이 호출 한 건.
    async fn set_trigger(
        &self,
        symbol: &str,
        position_id: &str,
        kind: TpslKind,
    ) -> Result<IntentOutcome, GatewayError> {
        let token = self.tokens.get(symbol)?.clone();

        // 방향이 필요하므로 포지션을 먼저 찾는다
        let position = self.locate(&token, position_id).await?;
        let quote = self.gateway.ticker_price(symbol).await?;
        let trigger_price = compute_trigger(position.side, kind, quote.last_price, &token);

        match kind {
            TpslKind::TakeProfit => {
                self.gateway
                    .set_take_profit(symbol, position_id, trigger_price)
                    .await?
            }
            TpslKind::StopLoss => {
                self.gateway
                    .set_stop_loss(symbol, position_id, trigger_price)
                    .await?
            }
        }

        info!(%position_id, %kind, %trigger_price, mark = %quote.last_price, "트리거 설정");
        Ok(IntentOutcome::TriggerSet {
            position_id: position_id.to_string(),
            kind,
            trigger_price,
        })
    }

    /// 청산: 항상 현재 수량의 100%.
    async fn close(&self, symbol: &str, position_id: &str) -> Result<IntentOutcome, GatewayError> {
        self.tokens.get(symbol)?;
        self.gateway.close_position(symbol, position_id).await?;
        info!(%position_id, "청산 완료");
        Ok(IntentOutcome::Closed {
            position_id: position_id.to_string(),
        })
    }

    /// 갱신: 포지션별 신선한 시세로 파생 지표 재계산, 심볼 정렬.
    async fn refresh(&self) -> Result<IntentOutcome, GatewayError> {
        let positions = self.gateway.pending_positions().await?;

        let mut enriched = Vec::with_capacity(positions.len());
        for position in positions {
            let token = self.tokens.get(&position.symbol)?.clone();
            let quote: MarketQuote = self.gateway.ticker_price(&position.symbol).await?;
            enriched.push(valuation::enrich(position, &quote, &token)?);
        }
        enriched.sort_by(|a, b| a.position.symbol.cmp(&b.position.symbol));

        Ok(IntentOutcome::Positions(enriched))
    }

    async fn locate(
        &self,
        token: &TokenConfig,
        position_id: &str,
    ) -> Result<Position, GatewayError> {
        self.gateway
            .pending_positions()
            .await?
            .into_iter()
            .find(|p| p.position_id == position_id && p.symbol == token.trading_symbol)
            .ok_or_else(|| GatewayError::PositionNotFound {
                position_id: position_id.to_string(),
            })
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use bitunix_exchange::{SimulatedConfig, SimulatedGateway};

    use super::*;

    fn setup() -> (PositionLifecycleController, Arc<SimulatedGateway>) {
        let tokens = Arc::new(TokenConfigManager::with_defaults());
        let gateway = Arc::new(SimulatedGateway::new(
            SimulatedConfig {
                initial_balance: dec!(1000),
                default_leverage: 10,
            },
            Arc::clone(&tokens),
        ));
        (
            PositionLifecycleController::new(
                Arc::clone(&gateway) as Arc<dyn ExecutionGateway>,
                tokens,
            ),
            gateway,
        )
    }

    async fn open_xrp(controller: &PositionLifecycleController, quantity: Decimal) -> String {
        match controller
            .handle(TradeIntent::Open {
                symbol: "XRPUSDT".to_string(),
                side: Side::Long,
                quantity,
            })
            .await
            .unwrap()
        {
            IntentOutcome::Placed(receipt) => receipt.order_id,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_compute_trigger_offsets() {
        let tokens = TokenConfigManager::with_defaults();
        let xrp = tokens.get("XRPUSDT").unwrap();

        // 롱: TP 위, SL 아래
        assert_eq!(
            compute_trigger(Side::Long, TpslKind::TakeProfit, dec!(0.75), xrp),
            dec!(0.765)
        );
        assert_eq!(
            compute_trigger(Side::Long, TpslKind::StopLoss, dec!(0.75), xrp),
            dec!(0.735)
        );
        // 숏: 반대 방향
        assert_eq!(
            compute_trigger(Side::Short, TpslKind::TakeProfit, dec!(0.75), xrp),
            dec!(0.735)
        );
        assert_eq!(
            compute_trigger(Side::Short, TpslKind::StopLoss, dec!(0.75), xrp),
            dec!(0.765)
        );
    }

    #[test]
    fn test_compute_trigger_respects_price_decimals() {
        let tokens = TokenConfigManager::with_defaults();
        let sol = tokens.get("SOLUSDT").unwrap();

        // 125.57 × 1.02 = 128.0814 → 가격 2자리로 반올림
        assert_eq!(
            compute_trigger(Side::Long, TpslKind::TakeProfit, dec!(125.57), sol),
            dec!(128.08)
        );
    }

    #[tokio::test]
    async fn test_open_then_refresh_enriches_position() {
        let (controller, gateway) = setup();
        let position_id = open_xrp(&controller, dec!(10)).await;

        gateway.set_price("XRPUSDT", dec!(0.80)).await;
        let outcome = controller.handle(TradeIntent::Refresh).await.unwrap();

        let IntentOutcome::Positions(positions) = outcome else {
            panic!("expected positions");
        };
        assert_eq!(positions.len(), 1);
        let enriched = &positions[0];
        assert_eq!(enriched.position.position_id, position_id);
        assert_eq!(enriched.mark_price, dec!(0.80));
        // pnl = 10 × (0.80 − 0.75) = 0.50
        assert_eq!(enriched.metrics.unrealized_pnl, dec!(0.50));
        // margin = 10 × 0.75 / 10 = 0.75
        assert_eq!(enriched.metrics.margin, dec!(0.75));
    }

    #[tokio::test]
    async fn test_refresh_sorted_by_symbol() {
        let (controller, _gateway) = setup();
        controller
            .handle(TradeIntent::Open {
                symbol: "SOLUSDT".to_string(),
                side: Side::Long,
                quantity: dec!(0.1),
            })
            .await
            .unwrap();
        open_xrp(&controller, dec!(10)).await;

        let IntentOutcome::Positions(positions) =
            controller.handle(TradeIntent::Refresh).await.unwrap()
        else {
            panic!("expected positions");
        };
        assert_eq!(positions[0].position.symbol, "SOLUSDT");
        assert_eq!(positions[1].position.symbol, "XRPUSDT");
    }

    #[tokio::test]
    async fn test_set_tp_uses_fresh_quote() {
        let (controller, gateway) = setup();
        let position_id = open_xrp(&controller, dec!(10)).await;

        // 진입가 0.75가 아니라 설정 시점 시세 0.80 기준으로 계산되어야 함
        gateway.set_price("XRPUSDT", dec!(0.80)).await;
        let outcome = controller
            .handle(TradeIntent::SetTakeProfit {
                symbol: "XRPUSDT".to_string(),
                position_id: position_id.clone(),
            })
            .await
            .unwrap();

        let IntentOutcome::TriggerSet { trigger_price, kind, .. } = outcome else {
            panic!("expected trigger");
        };
        assert_eq!(kind, TpslKind::TakeProfit);
        assert_eq!(trigger_price, dec!(0.816));

        let positions = gateway.pending_positions().await.unwrap();
        assert_eq!(positions[0].take_profit, Some(dec!(0.816)));
    }

    #[tokio::test]
    async fn test_set_sl_on_missing_position() {
        let (controller, _gateway) = setup();
        let err = controller
            .handle(TradeIntent::SetStopLoss {
                symbol: "XRPUSDT".to_string(),
                position_id: "SIM-404".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_below_minimum_rejected_before_gateway() {
        let (controller, gateway) = setup();

        let err = controller
            .handle(TradeIntent::Open {
                symbol: "XRPUSDT".to_string(),
                side: Side::Long,
                quantity: dec!(1.5),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BelowMinimumQuantity { .. }));
        assert!(err.is_validation());

        // 원장은 건드리지 않음
        let summary = gateway.paper_summary().await;
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_unknown_symbol_rejected() {
        let (controller, _gateway) = setup();
        let err = controller
            .handle(TradeIntent::Open {
                symbol: "DOGEUSDT".to_string(),
                side: Side::Short,
                quantity: dec!(1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownSymbol { .. }));
    }

    #[tokio::test]
    async fn test_close_settles_and_removes() {
        let (controller, gateway) = setup();
        let position_id = open_xrp(&controller, dec!(10)).await;

        gateway.set_price("XRPUSDT", dec!(0.70)).await;
        let outcome = controller
            .handle(TradeIntent::Close {
                symbol: "XRPUSDT".to_string(),
                position_id: position_id.clone(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, IntentOutcome::Closed { .. }));

        // 증거금 0.75 환입 + pnl −0.50
        let summary = gateway.paper_summary().await;
        assert_eq!(summary.balance, dec!(999.50));
        assert!(gateway.pending_positions().await.unwrap().is_empty());

        // 같은 id 재청산은 PositionNotFound
        let err = controller
            .handle(TradeIntent::Close {
                symbol: "XRPUSDT".to_string(),
                position_id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_close_single_winner() {
        let (controller, gateway) = setup();
        let position_id = open_xrp(&controller, dec!(10)).await;
        let controller = Arc::new(controller);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let controller = Arc::clone(&controller);
            let position_id = position_id.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .handle(TradeIntent::Close {
                        symbol: "XRPUSDT".to_string(),
                        position_id,
                    })
                    .await
            }));
        }

        let mut closed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(IntentOutcome::Closed { .. }) => closed += 1,
                Err(GatewayError::PositionNotFound { .. }) => {}
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert_eq!(closed, 1);

        // 정산은 정확히 한 번
        let summary = gateway.paper_summary().await;
        assert_eq!(summary.balance, dec!(1000));
    }
}
