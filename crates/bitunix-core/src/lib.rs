//! 선물 포지션 관리 핵심 크레이트.
//!
//! 거래소 중립적인 도메인 타입, 토큰 설정 레지스트리,
//! 포지션 평가 엔진, 실행 게이트웨이 추상화를 제공합니다.
//!
//! I/O는 포함하지 않습니다. 실제 거래소 연동과 시뮬레이션 원장은
//! `bitunix-exchange`, 인텐트 오케스트레이션은 `bitunix-execution`에 있습니다.

pub mod domain;
pub mod valuation;

pub use domain::gateway::{ExecutionGateway, GatewayError, UnreliableKind};
pub use domain::position::{
    EnrichedPosition, MarketQuote, OrderReceipt, Position, Side, TpslKind, TpslOrder,
};
pub use domain::token::{TokenConfig, TokenConfigManager};
pub use valuation::{PositionMetrics, ValuationError};
