//! 포지션 라이프사이클 오케스트레이션.
//!
//! 운영자 인텐트(진입, TP/SL 설정, 청산, 갱신)를 게이트웨이 호출과
//! 평가 갱신으로 변환합니다. 게이트웨이 변형(시뮬레이션/라이브)은
//! trait 객체 뒤에 숨겨져 있어 이 크레이트는 모드를 모릅니다.

pub mod controller;

pub use controller::{IntentOutcome, PositionLifecycleController, TradeIntent};
