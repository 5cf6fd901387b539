//! 실행 모드 선택.
//!
//! 모드 플래그가 소비되는 유일한 지점입니다. 이후 모든 호출자는
//! `Arc<dyn ExecutionGateway>`만 바라보므로 런타임 분기가 흩어지지 않습니다.

use std::sync::Arc;

use bitunix_core::{ExecutionGateway, TokenConfigManager};
use tracing::info;

use crate::connector::bitunix::{BitunixClient, BitunixConfig};
use crate::provider::live::LiveGateway;
use crate::provider::paper::SimulatedConfig;
use crate::provider::simulated::SimulatedGateway;

/// 실행 모드. 필요한 설정을 변형에 담아 전달합니다.
#[derive(Debug)]
pub enum ExecutionMode {
    /// 페이퍼 트레이딩 (실제 주문 없음)
    Simulated(SimulatedConfig),
    /// 실거래 (서명된 Bitunix REST)
    Live(BitunixConfig),
}

/// 게이트웨이 생성.
pub fn build_gateway(
    mode: ExecutionMode,
    tokens: Arc<TokenConfigManager>,
) -> Arc<dyn ExecutionGateway> {
    match mode {
        ExecutionMode::Simulated(config) => {
            info!(initial_balance = %config.initial_balance, "시뮬레이션 게이트웨이 생성");
            Arc::new(SimulatedGateway::new(config, tokens))
        }
        ExecutionMode::Live(config) => {
            info!("라이브 게이트웨이 생성");
            Arc::new(LiveGateway::new(BitunixClient::new(config), tokens))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_mode_builds_paper_gateway() {
        let gateway = build_gateway(
            ExecutionMode::Simulated(SimulatedConfig::default()),
            Arc::new(TokenConfigManager::with_defaults()),
        );
        assert_eq!(gateway.gateway_name(), "simulated");
        // 시작 상태는 포지션 없음
        assert!(gateway.pending_positions().await.unwrap().is_empty());
    }

    #[test]
    fn test_live_mode_builds_bitunix_gateway() {
        let gateway = build_gateway(
            ExecutionMode::Live(BitunixConfig::new("k", "s")),
            Arc::new(TokenConfigManager::with_defaults()),
        );
        assert_eq!(gateway.gateway_name(), "bitunix-live");
    }
}
