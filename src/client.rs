//! 변환 요청 클라이언트
//!
//! COMMAND 하나마다 새 소켓과 새 핸드쉐이크를 쓴다.
//! 업로드(SenderEngine) -> 결과 수신(Receiver) -> COMPLETE 순서.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::info;

use crate::link::Link;
use crate::message::{reason, CommandMessage};
use crate::receiver::Receiver;
use crate::sender::SenderEngine;
use crate::session::establish;
use crate::transform::ConversionMode;
use crate::{Config, Error, Result};

/// 서버가 돌려준 변환 결과
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    /// 서버가 지정한 출력 파일명
    pub filename: String,
    pub data: Bytes,
}

/// 변환 클라이언트
pub struct Client {
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 파일 하나를 업로드하고 변환 결과를 받는다
    pub async fn convert(
        &self,
        server: SocketAddr,
        mode: ConversionMode,
        filename: &str,
        data: Bytes,
    ) -> Result<ConvertedFile> {
        if data.is_empty() {
            return Err(Error::InvalidMetadata("빈 파일은 전송할 수 없음"));
        }

        let name = file_name(filename).ok_or(Error::InvalidCommand(reason::INVALID_COMMAND_FORMAT))?;
        // 명령은 공백으로 구분되므로 파일명에 공백 불가
        if name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidCommand(reason::INVALID_COMMAND_FORMAT));
        }

        let bind: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = Arc::new(UdpSocket::bind(bind).await?);

        let command = CommandMessage::new(mode.clone(), &name);
        let dedicated = establish(&socket, server, &command, &self.config).await?;

        let mut link = Link::new(socket, dedicated);

        info!("업로드 시작: {} ({} bytes, {})", name, data.len(), mode);
        SenderEngine::new(&mut link, &self.config)
            .send(&name, &mode, data)
            .await?;

        let mut receiver = Receiver::new(&mut link, &self.config);
        let result = receiver.receive(None).await?;
        receiver.complete(&result.filename, true).await?;

        info!("변환 결과 수신: {} ({} bytes)", result.filename, result.data.len());
        Ok(ConvertedFile {
            filename: result.filename,
            data: result.data,
        })
    }
}

/// 경로의 마지막 구성 요소만 남김
fn file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

/// 디렉토리 아래에 파일 저장 (상대가 준 이름의 경로 부분은 무시)
pub async fn store_file(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let name = file_name(name).ok_or(Error::InvalidMetadata("저장할 파일명이 없음"))?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

/// 변환 결과 저장
pub async fn save_output(dir: &Path, converted: &ConvertedFile) -> Result<PathBuf> {
    let path = store_file(dir, &converted.filename, &converted.data).await?;
    info!("결과 저장: {:?}", path);
    Ok(path)
}
