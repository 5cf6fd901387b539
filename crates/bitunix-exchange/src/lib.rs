//! Bitunix 선물 거래소 연동 크레이트.
//!
//! 두 가지 `ExecutionGateway` 변형을 제공합니다:
//! - `LiveGateway`: 검증된 Bitunix REST 엔드포인트에 서명 요청을 보내는 라이브 변형
//! - `SimulatedGateway`: 페이퍼 트레이딩 원장 기반 시뮬레이션 변형
//!
//! 모드 선택은 `build_gateway`에서 한 번만 일어나며,
//! 이후 호출자는 trait 객체만 바라봅니다.

pub mod connector;
pub mod mode;
pub mod provider;

pub use connector::bitunix::{BitunixClient, BitunixConfig};
pub use mode::{build_gateway, ExecutionMode};
pub use provider::live::LiveGateway;
pub use provider::paper::{PaperEngine, PaperFill, PaperSummary, SimulatedConfig};
pub use provider::simulated::SimulatedGateway;
