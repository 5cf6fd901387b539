//! 토큰별 거래 파라미터 레지스트리.
//!
//! 심볼별 최소 주문 수량, 수량/가격 정밀도, 유지증거금률을 관리합니다.
//! 로드 이후 불변이며, 모든 컴포넌트가 읽기 전용으로 조회합니다.
//! 지원하지 않는 심볼의 인텐트는 거래소 호출 전에 여기서 거절되어야 합니다.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::gateway::GatewayError;

// =============================================================================
// 토큰 설정
// =============================================================================

/// 심볼별 거래 파라미터.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// 토큰 심볼 (예: "XRP")
    pub symbol: String,
    /// 거래 페어 심볼 (예: "XRPUSDT")
    pub trading_symbol: String,
    /// 최소 주문 수량
    pub min_quantity: Decimal,
    /// 수량 소수 자릿수
    pub quantity_decimals: u32,
    /// 가격 소수 자릿수 (TP/SL 트리거 가격 반올림에 사용)
    pub price_decimals: u32,
    /// 유지증거금률 (예: 0.005 = 0.5%)
    pub maintenance_margin_rate: Decimal,
}

impl TokenConfig {
    /// 수량을 토큰 정밀도로 반올림.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        quantity.round_dp(self.quantity_decimals)
    }

    /// 가격을 토큰 정밀도로 반올림.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp(self.price_decimals)
    }
}

// =============================================================================
// 레지스트리
// =============================================================================

/// 토큰 설정 레지스트리.
///
/// 초기화 이후 변경되지 않으며, 토큰 심볼과 거래 페어 심볼
/// 어느 쪽으로도 조회할 수 있습니다 ("XRP"와 "XRPUSDT" 모두 허용).
#[derive(Debug, Clone, Default)]
pub struct TokenConfigManager {
    configs: HashMap<String, TokenConfig>,
}

impl TokenConfigManager {
    /// 빈 레지스트리 생성.
    pub fn new() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// 기본 지원 토큰으로 레지스트리 생성.
    ///
    /// 최소 수량과 정밀도는 거래소에서 확인한 값입니다.
    /// 유지증거금률은 전 토큰 공통 0.5%를 사용합니다.
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        let defaults = [
            ("XRP", "XRPUSDT", dec!(2), 1u32, 4u32),
            ("ADA", "ADAUSDT", dec!(1), 1, 4),
            ("SUI", "SUIUSDT", dec!(0.1), 2, 4),
            ("UNI", "UNIUSDT", dec!(0.1), 2, 3),
            ("LINK", "LINKUSDT", dec!(0.1), 2, 3),
            ("SOL", "SOLUSDT", dec!(0.01), 3, 2),
        ];
        for (symbol, trading_symbol, min_quantity, quantity_decimals, price_decimals) in defaults {
            manager.insert(TokenConfig {
                symbol: symbol.to_string(),
                trading_symbol: trading_symbol.to_string(),
                min_quantity,
                quantity_decimals,
                price_decimals,
                maintenance_margin_rate: dec!(0.005),
            });
        }
        manager
    }

    /// 토큰 설정 추가 (초기화 시점 전용).
    pub fn insert(&mut self, config: TokenConfig) {
        self.configs
            .insert(config.trading_symbol.clone(), config.clone());
        self.configs.insert(config.symbol.clone(), config);
    }

    /// 심볼로 설정 조회.
    ///
    /// # Errors
    ///
    /// 지원하지 않는 심볼이면 `GatewayError::UnknownSymbol`.
    pub fn get(&self, symbol: &str) -> Result<&TokenConfig, GatewayError> {
        self.configs
            .get(symbol)
            .ok_or_else(|| GatewayError::UnknownSymbol {
                symbol: symbol.to_string(),
            })
    }

    /// 지원 토큰 심볼 목록 (거래 페어 기준, 정렬됨).
    pub fn trading_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .configs
            .values()
            .map(|c| c.trading_symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

// =============================================================================
// 테스트
// =============================================================================
