//! SWP 클라이언트 - 파일 하나를 업로드하고 변환 결과를 받는다
//!
//! 사용법:
//!   cargo run --release --bin swp-client -- [OPTIONS] <FILE> --to <FORMAT>
//!
//! 예시:
//!   # txt -> pdf
//!   cargo run --release --bin swp-client -- notes.txt --to pdf
//!
//!   # 원격 서버, 결과를 ./out 에 저장
//!   cargo run --release --bin swp-client -- -s 10.0.0.5:5051 photo.jpg --to png -o out

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swp::{client::save_output, Client, Config, ConversionMode, DEFAULT_SERVER_PORT};

/// SWP Client - request a file conversion over UDP
#[derive(Debug, Parser)]
#[command(name = "swp-client", version)]
struct Args {
    /// File to convert
    file: PathBuf,

    /// Target format (e.g. pdf, png)
    #[arg(short, long)]
    to: String,

    /// Source format (defaults to the file extension)
    #[arg(short, long)]
    from: Option<String>,

    /// Server well-known address
    #[arg(short, long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_SERVER_PORT)))]
    server: SocketAddr,

    /// Directory for the converted file
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Use the unstable-network timing preset
    #[arg(long)]
    unstable: bool,
}

fn source_format(args: &Args) -> Option<String> {
    args.from.clone().or_else(|| {
        args.file
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 로깅 설정 (RUST_LOG, 기본 info)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let source = source_format(&args).ok_or("source format unknown: pass --from")?;
    let mode = ConversionMode::new(&source, &args.to);

    let filename = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or("invalid file path")?;

    info!("Loading file: {:?}", args.file);
    let data = Bytes::from(tokio::fs::read(&args.file).await?);
    info!("Data size: {} bytes", data.len());

    let config = if args.unstable {
        Config::unstable_network()
    } else {
        Config::default()
    };
    let client = Client::new(config);

    info!("Requesting {} from {}", mode, args.server);
    let converted = client.convert(args.server, mode, &filename, data).await?;

    let path = save_output(Path::new(&args.output), &converted).await?;
    info!("Saved {} ({} bytes)", path.display(), converted.data.len());

    Ok(())
}
