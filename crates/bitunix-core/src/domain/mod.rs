//! 도메인 타입 모듈.

pub mod gateway;
pub mod position;
pub mod token;
