//! SWP 서버 - Stop-and-Wait 파일 변환 서버
//!
//! well-known 포트에서 COMMAND를 받고, 전송마다 전용 포트를 열어
//! 업로드 수신 -> 변환 -> 결과 반송을 처리한다.
//!
//! 사용법:
//!   cargo run --release --bin swp-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트(5051)
//!   cargo run --release --bin swp-server
//!
//!   # 업로드 원본 저장 + 불안정 네트워크 설정
//!   cargo run --release --bin swp-server -- --storage ./uploads --preset unstable

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swp::{Config, EchoTransform, Responder, DEFAULT_SERVER_PORT};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    LowLatency,
    Unstable,
}

/// SWP Server - Stop-and-Wait file conversion over UDP
#[derive(Debug, Parser)]
#[command(name = "swp-server", version)]
struct Args {
    /// Well-known bind address
    #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_SERVER_PORT)))]
    bind: SocketAddr,

    /// Directory to keep uploaded originals in
    #[arg(short, long)]
    storage: Option<PathBuf>,

    /// Protocol timing preset
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    /// ACK timeout in milliseconds (overrides preset)
    #[arg(long)]
    ack_timeout_ms: Option<u64>,

    /// Retransmissions per step (overrides preset)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Largest accepted upload in bytes
    #[arg(long)]
    max_file_size: Option<u64>,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = match self.preset {
            Preset::Default => Config::default(),
            Preset::LowLatency => Config::low_latency(),
            Preset::Unstable => Config::unstable_network(),
        };
        if let Some(ms) = self.ack_timeout_ms {
            config.ack_timeout_ms = ms;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 로깅 설정 (RUST_LOG, 기본 info)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.config();
    info!("SWP Server starting...");
    info!("ACK timeout: {:?}", config.ack_timeout());
    info!("Max retries: {}", config.max_retries);
    info!("Max file size: {} bytes", config.max_file_size);

    let transform = Arc::new(EchoTransform::default());
    let mut responder = Responder::bind(args.bind, config, transform).await?;
    if let Some(dir) = &args.storage {
        info!("Storing uploads in {:?}", dir);
        responder = responder.with_storage(dir.clone());
    }
    let responder = Arc::new(responder);

    info!("Server listening on {}", responder.local_addr()?);

    let running = responder.clone();
    tokio::select! {
        result = running.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            responder.stop();
        }
    }

    Ok(())
}
