//! 변환기 인터페이스
//!
//! 전송 계층은 바이트를 해석하지 않는다. 검증된 바이트를 `Transform`에 넘기고,
//! 돌려받은 결과를 다시 무결하게 전달하는 것까지만 책임진다.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 변환 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("지원하지 않는 변환: {0}")]
    Unsupported(ConversionMode),

    #[error("변환 실패: {0}")]
    Failed(String),
}

/// 변환 모드 (원본 형식 -> 대상 형식)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionMode {
    pub source: String,
    pub target: String,
}

impl ConversionMode {
    /// 형식 이름 정규화: 앞의 '.' 제거, 소문자화
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: normalize_format(source),
            target: normalize_format(target),
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// 변환 결과
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub filename: String,
    pub data: Vec<u8>,
}

/// 외부 변환기
pub trait Transform: Send + Sync {
    /// 해당 모드를 처리할 수 있는지
    fn supports(&self, mode: &ConversionMode) -> bool;

    /// 검증된 바이트를 변환
    fn transform(
        &self,
        filename: &str,
        mode: &ConversionMode,
        data: &[u8],
    ) -> Result<TransformOutput, ConversionError>;
}

/// 입력을 그대로 돌려주는 변환기
///
/// 내용은 건드리지 않고 출력 파일명만 `<stem>_<id>.<target>`으로 바꾼다.
/// 실제 문서/이미지 변환기를 연결하기 전 전송 경로 검증에 쓴다.
#[derive(Debug, Clone)]
pub struct EchoTransform {
    supported: Vec<ConversionMode>,
}

impl EchoTransform {
    pub fn new(supported: Vec<ConversionMode>) -> Self {
        Self { supported }
    }
}

impl Default for EchoTransform {
    fn default() -> Self {
        Self::new(vec![
            ConversionMode::new("txt", "pdf"),
            ConversionMode::new("jpeg", "png"),
            ConversionMode::new("jpg", "png"),
        ])
    }
}

impl Transform for EchoTransform {
    fn supports(&self, mode: &ConversionMode) -> bool {
        self.supported.contains(mode)
    }

    fn transform(
        &self,
        filename: &str,
        mode: &ConversionMode,
        data: &[u8],
    ) -> Result<TransformOutput, ConversionError> {
        if !self.supports(mode) {
            return Err(ConversionError::Unsupported(mode.clone()));
        }

        Ok(TransformOutput {
            filename: output_filename(filename, &mode.target),
            data: data.to_vec(),
        })
    }
}

/// 출력 파일명 생성: `<stem>_<8자리 hex>.<target>`
pub fn output_filename(filename: &str, target: &str) -> String {
    let stem = std::path::Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    format!("{}_{:08x}.{}", stem, rand::random::<u32>(), target)
}
