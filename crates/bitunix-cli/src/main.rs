//! Bitunix 선물 포지션 관리 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 시뮬레이션 모드에서 XRP 롱 2개 진입
//! TRADER_MODE=simulated bitunix-trader open -s XRPUSDT --side buy -q 2
//!
//! # 현재가 +2%에 익절 트리거 설정
//! bitunix-trader set-tp -s XRPUSDT -p SIM-1
//!
//! # 포지션 전량 청산
//! bitunix-trader close -s XRPUSDT -p SIM-1
//!
//! # 전체 포지션 평가 갱신
//! bitunix-trader refresh
//!
//! # 페이퍼 계정 요약 (시뮬레이션 전용)
//! bitunix-trader balance
//! ```
//!
//! 라이브 모드는 `TRADER_MODE=live`와 `BITUNIX_API_KEY` /
//! `BITUNIX_SECRET_KEY` 환경 변수가 필요합니다.

use std::sync::Arc;

use anyhow::{bail, Context};
use bitunix_core::{EnrichedPosition, Side, TokenConfigManager};
use bitunix_exchange::{
    build_gateway, BitunixConfig, ExecutionMode, SimulatedConfig, SimulatedGateway,
};
use bitunix_execution::{IntentOutcome, PositionLifecycleController, TradeIntent};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

#[derive(Parser)]
#[command(name = "bitunix-trader")]
#[command(about = "Bitunix 선물 포지션 관리 CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 시장가 진입 주문
    Open {
        /// 거래 심볼 (예: XRPUSDT 또는 XRP)
        #[arg(short, long)]
        symbol: String,

        /// 방향 (buy/long 또는 sell/short)
        #[arg(long)]
        side: String,

        /// 주문 수량
        #[arg(short, long)]
        quantity: Decimal,
    },

    /// 익절 트리거 설정 (현재가 +2%, 가격은 자동 계산)
    SetTp {
        #[arg(short, long)]
        symbol: String,

        /// 대상 포지션 id
        #[arg(short, long)]
        position_id: String,
    },

    /// 손절 트리거 설정 (현재가 −2%, 가격은 자동 계산)
    SetSl {
        #[arg(short, long)]
        symbol: String,

        #[arg(short, long)]
        position_id: String,
    },

    /// 포지션 전량 청산
    Close {
        #[arg(short, long)]
        symbol: String,

        #[arg(short, long)]
        position_id: String,
    },

    /// 오픈 포지션 전체 평가 갱신
    Refresh,

    /// 페이퍼 계정 요약 (시뮬레이션 모드 전용)
    Balance,
}

fn parse_side(input: &str) -> anyhow::Result<Side> {
    match input.to_ascii_lowercase().as_str() {
        "buy" | "long" => Ok(Side::Long),
        "sell" | "short" => Ok(Side::Short),
        other => bail!("잘못된 방향: {other}. buy/long 또는 sell/short"),
    }
}

/// TRADER_MODE 환경 변수에서 실행 모드 결정. 기본은 시뮬레이션.
fn load_mode() -> anyhow::Result<ExecutionMode> {
    let mode = std::env::var("TRADER_MODE").unwrap_or_else(|_| "simulated".to_string());
    match mode.to_ascii_lowercase().as_str() {
        "simulated" | "paper" | "test" => Ok(ExecutionMode::Simulated(SimulatedConfig::default())),
        "live" => {
            let api_key = std::env::var("BITUNIX_API_KEY")
                .context("라이브 모드에는 BITUNIX_API_KEY가 필요합니다")?;
            let secret_key = std::env::var("BITUNIX_SECRET_KEY")
                .context("라이브 모드에는 BITUNIX_SECRET_KEY가 필요합니다")?;
            Ok(ExecutionMode::Live(BitunixConfig::new(api_key, secret_key)))
        }
        other => bail!("잘못된 TRADER_MODE: {other}. simulated 또는 live"),
    }
}

fn print_positions(positions: &[EnrichedPosition], tokens: &TokenConfigManager) {
    if positions.is_empty() {
        println!("오픈 포지션 없음");
        return;
    }

    println!(
        "{:<10} {:<8} {:<6} {:>12} {:>12} {:>12} {:>12} {:>10} {:>12}",
        "Symbol", "ID", "Side", "Qty", "Entry", "Mark", "PnL", "ROI(%)", "Liq.Price"
    );
    for p in positions {
        let qty = match tokens.get(&p.position.symbol) {
            Ok(token) => token.round_quantity(p.position.quantity),
            Err(_) => p.position.quantity,
        };
        println!(
            "{:<10} {:<8} {:<6} {:>12} {:>12} {:>12} {:>12} {:>10} {:>12}",
            p.position.symbol,
            p.position.position_id,
            p.position.side.to_string(),
            qty,
            p.position.entry_price.round_dp(4),
            p.mark_price.round_dp(4),
            p.metrics.unrealized_pnl.round_dp(4),
            p.metrics.roi.round_dp(2),
            p.metrics.liquidation_price.round_dp(4),
        );
    }
}

async fn run_intent(
    intent: TradeIntent,
    mode: ExecutionMode,
    tokens: Arc<TokenConfigManager>,
) -> anyhow::Result<()> {
    let gateway = build_gateway(mode, Arc::clone(&tokens));
    let controller = PositionLifecycleController::new(gateway, Arc::clone(&tokens));

    match controller.handle(intent).await? {
        IntentOutcome::Placed(receipt) => {
            println!(
                "주문 접수: {} {} {} (order_id: {})",
                receipt.symbol, receipt.side, receipt.quantity, receipt.order_id
            );
        }
        IntentOutcome::TriggerSet {
            position_id,
            kind,
            trigger_price,
        } => {
            println!("{kind} 설정: {position_id} @ {trigger_price}");
        }
        IntentOutcome::Closed { position_id } => {
            println!("청산 완료: {position_id}");
        }
        IntentOutcome::Positions(positions) => {
            print_positions(&positions, &tokens);
        }
    }
    Ok(())
}

async fn run_balance(mode: ExecutionMode, tokens: Arc<TokenConfigManager>) -> anyhow::Result<()> {
    let ExecutionMode::Simulated(config) = mode else {
        bail!("balance는 시뮬레이션 모드 전용입니다");
    };

    let gateway = SimulatedGateway::new(config, tokens);
    let summary = gateway.paper_summary().await;
    println!("잔고:        {} USDT", summary.balance.round_dp(4));
    println!("오픈 포지션: {}", summary.open_positions);
    println!("총 체결:     {}", summary.total_trades);
    println!("실현 손익:   {} USDT", summary.realized_pnl.round_dp(4));
    println!("승률:        {}%", summary.win_rate.round_dp(2));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (없어도 에러 안남)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mode = load_mode()?;
    let tokens = Arc::new(TokenConfigManager::with_defaults());
    info!(supported = ?tokens.trading_symbols(), "토큰 레지스트리 로드");

    match cli.command {
        Commands::Open {
            symbol,
            side,
            quantity,
        } => {
            let side = parse_side(&side)?;
            run_intent(
                TradeIntent::Open {
                    symbol,
                    side,
                    quantity,
                },
                mode,
                tokens,
            )
            .await
        }
        Commands::SetTp {
            symbol,
            position_id,
        } => {
            run_intent(
                TradeIntent::SetTakeProfit {
                    symbol,
                    position_id,
                },
                mode,
                tokens,
            )
            .await
        }
        Commands::SetSl {
            symbol,
            position_id,
        } => {
            run_intent(
                TradeIntent::SetStopLoss {
                    symbol,
                    position_id,
                },
                mode,
                tokens,
            )
            .await
        }
        Commands::Close {
            symbol,
            position_id,
        } => {
            run_intent(
                TradeIntent::Close {
                    symbol,
                    position_id,
                },
                mode,
                tokens,
            )
            .await
        }
        Commands::Refresh => run_intent(TradeIntent::Refresh, mode, tokens).await,
        Commands::Balance => run_balance(mode, tokens).await,
    }
}
