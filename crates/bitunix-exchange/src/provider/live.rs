//! 라이브 실행 게이트웨이.
//!
//! `BitunixClient`의 검증된 호출 표면 위에서 `ExecutionGateway`를 구현합니다.
//! 심볼/최소 수량 검증은 네트워크 호출 전에 로컬에서 수행하고,
//! 거래소 원시 행을 중립 `Position` 타입으로 변환합니다.

use std::sync::Arc;

use async_trait::async_trait;
use bitunix_core::{
    ExecutionGateway, GatewayError, MarketQuote, OrderReceipt, Position, Side, TokenConfig,
    TokenConfigManager, ValuationError,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::connector::bitunix::{client::RawPosition, BitunixClient};

// ============================================================================
// 변환
// ============================================================================

fn convert_position(raw: RawPosition) -> Position {
    let side = if raw.side == "SELL" {
        Side::Short
    } else {
        Side::Long
    };
    let mut position = Position::new(
        raw.symbol,
        raw.position_id,
        side,
        raw.qty,
        raw.avg_open_price,
        raw.leverage.max(1),
    );
    if let Some(mode) = raw.margin_mode {
        position.margin_mode = mode;
    }
    position
}

// ============================================================================
// 게이트웨이
// ============================================================================

pub struct LiveGateway {
    client: BitunixClient,
    tokens: Arc<TokenConfigManager>,
}

impl LiveGateway {
    pub fn new(client: BitunixClient, tokens: Arc<TokenConfigManager>) -> Self {
        Self { client, tokens }
    }

    /// 오픈 포지션에서 대상 id를 찾음. 없으면 `PositionNotFound`.
    async fn find_position(
        &self,
        symbol: &str,
        position_id: &str,
    ) -> Result<Position, GatewayError> {
        let positions = self.pending_positions().await?;
        positions
            .into_iter()
            .find(|p| p.position_id == position_id && p.symbol == symbol)
            .ok_or_else(|| GatewayError::PositionNotFound {
                position_id: position_id.to_string(),
            })
    }
}

#[async_trait]
impl ExecutionGateway for LiveGateway {
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
        let data = self
            .client
            .place_open_order(&token.trading_symbol, side, quantity)
            .await?;

        info!(symbol = %token.trading_symbol, %side, %quantity, order_id = %data.order_id, "라이브 진입 주문 접수");
        Ok(OrderReceipt {
            order_id: data.order_id,
            symbol: token.trading_symbol,
            side,
            quantity,
        })
    }

    async fn pending_positions(&self) -> Result<Vec<Position>, GatewayError> {
        let rows = self.client.pending_positions().await?;
        Ok(rows.into_iter().map(convert_position).collect())
    }

    async fn ticker_price(&self, symbol: &str) -> Result<MarketQuote, GatewayError> {
        let token = self.tokens.get(symbol)?;
        let tickers = self.client.tickers(&token.trading_symbol).await?;

        let ticker = tickers
            .into_iter()
            .find(|t| t.symbol == token.trading_symbol)
            .ok_or_else(|| ValuationError::InvalidQuote {
                symbol: token.trading_symbol.clone(),
            })?;
        if ticker.last_price.is_zero() {
            return Err(ValuationError::InvalidQuote {
                symbol: token.trading_symbol.clone(),
            }
            .into());
        }
        Ok(MarketQuote::now(ticker.symbol, ticker.last_price))
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        position_id: &str,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError> {
        let position = self.find_position(symbol, position_id).await?;
        self.client
            .place_position_tpsl(&position.symbol, position_id, Some(trigger_price), None)
            .await
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        position_id: &str,
        trigger_price: Decimal,
    ) -> Result<(), GatewayError> {
        let position = self.find_position(symbol, position_id).await?;
        self.client
            .place_position_tpsl(&position.symbol, position_id, None, Some(trigger_price))
            .await
    }

    /// 전량 청산. 현재 수량을 조회한 뒤 positionId 필수의
    /// MARKET CLOSE 주문을 제출합니다.
    ///
    /// side 해석은 거래소 모드에 따라 달라진 이력이 있어,
    /// 직관적 방향(롱 청산 → SELL)이 거절되면 문서 변형(롱 청산 → BUY)으로
    /// 한 번 더 시도합니다.
    async fn close_position(&self, symbol: &str, position_id: &str) -> Result<(), GatewayError> {
        let position = self.find_position(symbol, position_id).await?;

        let intuitive = position.side.opposite();
        match self
            .client
            .place_close_order(&position.symbol, position_id, intuitive, position.quantity)
            .await
        {
            Ok(data) => {
                info!(%position_id, order_id = %data.order_id, "라이브 청산 주문 접수");
                Ok(())
            }
            Err(GatewayError::UpstreamRejected { code, message }) => {
                warn!(%position_id, code, %message, "청산 side 거절, 문서 변형으로 재시도");
                let data = self
                    .client
                    .place_close_order(&position.symbol, position_id, position.side, position.quantity)
                    .await?;
                info!(%position_id, order_id = %data.order_id, "라이브 청산 주문 접수 (문서 변형)");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    async fn token_info(&self, symbol: &str) -> Result<TokenConfig, GatewayError> {
        self.tokens.get(symbol).cloned()
    }

    fn gateway_name(&self) -> &str {
        "bitunix-live"
    }
}

// ============================================================================
// 테스트
// ============================================================================
