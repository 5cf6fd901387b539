//! 시뮬레이션 실행 게이트웨이.
//!
//! 페이퍼 원장과 모의 가격 테이블 위에서 `ExecutionGateway`를 구현합니다.
//! 검증 경로(심볼, 최소 수량)는 라이브 변형과 동일하므로
//! 실제 정산을 제외하면 관찰 가능한 동작이 같습니다.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bitunix_core::{
    ExecutionGateway, GatewayError, MarketQuote, OrderReceipt, Position, Side, TokenConfig,
    TokenConfigManager, TpslKind, ValuationError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::debug;

use super::paper::{PaperEngine, PaperSummary, SimulatedConfig};

// ============================================================================
// 게이트웨이
// ============================================================================

pub struct SimulatedGateway {
    engine: RwLock<PaperEngine>,
    prices: RwLock<HashMap<String, Decimal>>,
    tokens: Arc<TokenConfigManager>,
}

impl SimulatedGateway {
    pub fn new(config: SimulatedConfig, tokens: Arc<TokenConfigManager>) -> Self {
        Self {
            engine: RwLock::new(PaperEngine::new(config)),
            prices: RwLock::new(Self::default_prices()),
            tokens,
        }
    }

    /// 기본 모의 가격 테이블.
    fn default_prices() -> HashMap<String, Decimal> {
        [
            ("XRPUSDT", dec!(0.75)),
            ("ADAUSDT", dec!(0.45)),
            ("SUIUSDT", dec!(1.85)),
            ("UNIUSDT", dec!(8.50)),
            ("LINKUSDT", dec!(15.20)),
            ("SOLUSDT", dec!(125.50)),
        ]
        .into_iter()
        .map(|(s, p)| (s.to_string(), p))
        .collect()
    }

    /// 모의 가격 갱신 (테스트/운영자 조작용).
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// 계정 요약 스냅샷.
    pub async fn paper_summary(&self) -> PaperSummary {
        self.engine.read().await.summary()
    }

    /// 심볼 검증 후 현재 모의 가격 조회. 0 또는 누락이면 `InvalidQuote`.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let token = self.tokens.get(symbol)?;
        let prices = self.prices.read().await;
        match prices.get(&token.trading_symbol) {
            Some(price) if !price.is_zero() => Ok(*price),
            _ => Err(ValuationError::InvalidQuote {
                symbol: token.trading_symbol.clone(),
            }
            .into()),
        }
    }

    async fn set_trigger(
        &self,
        symbol: &str,
        position_id: &str,
        kind: TpslKind,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError> {
        self.tokens.get(symbol)?;
        self.engine
            .write()
            .await
            .set_trigger(position_id, kind, trigger_price)
    }
}

#[async_trait]
impl ExecutionGateway for SimulatedGateway {
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderReceipt, GatewayError> {
        let token = self.tokens.get(symbol)?.clone();
        if quantity < token.min_quantity {
            return Err(GatewayError::BelowMinimumQuantity {
                symbol: token.trading_symbol,
                quantity,
                minimum: token.min_quantity,
            });
        }

        let quantity = token.round_quantity(quantity);
        let price = self.current_price(symbol).await?;

        debug!(symbol = %token.trading_symbol, %side, %quantity, %price, "시뮬레이션 주문");
        self.engine
            .write()
            .await
            .open(&token.trading_symbol, side, quantity, price)
    }

    async fn pending_positions(&self) -> Result<Vec<Position>, GatewayError> {
        Ok(self.engine.read().await.open_positions())
    }

    async fn ticker_price(&self, symbol: &str) -> Result<MarketQuote, GatewayError> {
        let token = self.tokens.get(symbol)?;
        let price = self.current_price(symbol).await?;
        Ok(MarketQuote::now(token.trading_symbol.clone(), price))
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        position_id: &str,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError> {
        self.set_trigger(symbol, position_id, TpslKind::TakeProfit, trigger_price)
            .await
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        position_id: &str,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError> {
        self.set_trigger(symbol, position_id, TpslKind::StopLoss, trigger_price)
            .await
    }

    async fn close_position(&self, symbol: &str, position_id: &str) -> Result<(), GatewayError> {
        let exit_price = self.current_price(symbol).await?;
        // 존재 확인과 정산은 같은 쓰기 락 안에서 일어나므로
        // 동시 청산 경합에서 정확히 한 호출만 성공한다
        self.engine.write().await.close(position_id, exit_price)?;
        Ok(())
    }

    async fn token_info(&self, symbol: &str) -> Result<TokenConfig, GatewayError> {
        self.tokens.get(symbol).cloned()
    }

    fn gateway_name(&self) -> &str {
        "simulated"
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> Arc<SimulatedGateway> {
        Arc::new(SimulatedGateway::new(
            SimulatedConfig {
                initial_balance: dec!(1000),
                default_leverage: 2,
            },
            Arc::new(TokenConfigManager::with_defaults()),
        ))
    }

    #[tokio::test]
    async fn test_open_with_default_price_table() {
        let gateway = gateway();

        let receipt = gateway
            .place_market_order("XRP", Side::Long, dec!(10))
            .await
            .unwrap();
        assert_eq!(receipt.symbol, "XRPUSDT");
        assert_eq!(receipt.order_id, "SIM-1");

        // 증거금 10 × 0.75 / 2 = 3.75
        let summary = gateway.paper_summary().await;
        assert_eq!(summary.balance, dec!(996.25));
    }

    #[tokio::test]
    async fn test_below_minimum_rejected_without_ledger_touch() {
        let gateway = gateway();

        // XRP 최소 수량 2
        let err = gateway
            .place_market_order("XRPUSDT", Side::Long, dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BelowMinimumQuantity { .. }));

        let summary = gateway.paper_summary().await;
        assert_eq!(summary.balance, dec!(1000));
        assert_eq!(summary.total_trades, 0);
    }

    #[tokio::test]
    async fn test_unknown_symbol_rejected() {
        let gateway = gateway();
        let err = gateway
            .place_market_order("DOGEUSDT", Side::Long, dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownSymbol { .. }));
    }

    #[tokio::test]
    async fn test_zero_price_is_invalid_quote() {
        let gateway = gateway();
        gateway.set_price("XRPUSDT", Decimal::ZERO).await;

        let err = gateway.ticker_price("XRPUSDT").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Valuation(ValuationError::InvalidQuote { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_settles_at_current_price() {
        let gateway = gateway();

        let receipt = gateway
            .place_market_order("XRPUSDT", Side::Long, dec!(10))
            .await
            .unwrap();
        // 진입 0.75, 증거금 3.75 예약

        gateway.set_price("XRPUSDT", dec!(0.80)).await;
        gateway
            .close_position("XRPUSDT", &receipt.order_id)
            .await
            .unwrap();

        // pnl = 10 × (0.80 − 0.75) = 0.50 → 잔고 1000 + 0.50
        let summary = gateway.paper_summary().await;
        assert_eq!(summary.balance, dec!(1000.50));
        assert_eq!(summary.realized_pnl, dec!(0.50));
    }

    #[tokio::test]
    async fn test_concurrent_close_exactly_one_success() {
        let gateway = gateway();
        let receipt = gateway
            .place_market_order("XRPUSDT", Side::Long, dec!(10))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gateway = Arc::clone(&gateway);
            let id = receipt.order_id.clone();
            handles.push(tokio::spawn(async move {
                gateway.close_position("XRPUSDT", &id).await
            }));
        }

        let mut successes = 0;
        let mut not_found = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(GatewayError::PositionNotFound { .. }) => not_found += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(not_found, 7);

        // 증거금 환입은 정확히 한 번 (진입가=청산가이므로 잔고 원복)
        let summary = gateway.paper_summary().await;
        assert_eq!(summary.balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_tpsl_recorded_on_position() {
        let gateway = gateway();
        let receipt = gateway
            .place_market_order("SOLUSDT", Side::Short, dec!(0.1))
            .await
            .unwrap();

        gateway
            .set_take_profit("SOLUSDT", &receipt.order_id, dec!(123.0))
            .await
            .unwrap();
        gateway
            .set_stop_loss("SOLUSDT", &receipt.order_id, dec!(128.0))
            .await
            .unwrap();

        let positions = gateway.pending_positions().await.unwrap();
        assert_eq!(positions[0].take_profit, Some(dec!(123.0)));
        assert_eq!(positions[0].stop_loss, Some(dec!(128.0)));
    }
}
