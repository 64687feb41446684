//! 프로토콜 설정

use std::time::Duration;

/// SWP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// ACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 단계별 최대 재전송 횟수
    /// 최초 전송 1회 + 재전송 max_retries회 후 실패
    pub max_retries: u32,

    /// COMPLETE 대기 타임아웃 (밀리초)
    /// 상대측 변환 시간이 포함되므로 ACK 타임아웃과 분리
    pub complete_timeout_ms: u64,

    /// 핸드쉐이크 응답(OK/ERROR) 대기 타임아웃 (밀리초)
    pub handshake_timeout_ms: u64,

    /// 수신 측 유휴 타임아웃 (밀리초)
    /// 이 시간 동안 패킷이 전혀 없으면 전송 실패
    pub idle_timeout_ms: u64,

    /// 수신 허용 최대 파일 크기 (바이트)
    pub max_file_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 2000,             // 2초
            max_retries: 5,
            complete_timeout_ms: 2000,
            handshake_timeout_ms: 5000,       // 5초
            idle_timeout_ms: 30_000,          // 30초
            max_file_size: 512 * 1024 * 1024, // 512MB
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn complete_timeout(&self) -> Duration {
        Duration::from_millis(self.complete_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// COMPLETE 전송 후 남아 있는 시간
    ///
    /// 상대의 COMPLETE 대기 타임아웃 두 주기. 그 안에 재전송된 HASH가 반드시 도착한다.
    pub fn linger(&self) -> Duration {
        self.complete_timeout() * 2
    }

    /// 거부 판정 후 세션이 남아 있는 시간
    ///
    /// 요청 측이 전용 주소로 COMMAND를 재전송하는 전체 구간을 덮는다.
    pub fn verdict_linger(&self) -> Duration {
        self.handshake_timeout() * self.attempts_per_step()
    }

    /// 한 단계에서 허용되는 총 전송 횟수
    pub fn attempts_per_step(&self) -> u32 {
        self.max_retries + 1
    }

    /// 저지연 LAN용 설정
    pub fn low_latency() -> Self {
        Self {
            ack_timeout_ms: 200,
            max_retries: 5,
            complete_timeout_ms: 1000,
            handshake_timeout_ms: 1000,
            idle_timeout_ms: 10_000,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            ack_timeout_ms: 3000,
            max_retries: 10,
            complete_timeout_ms: 5000,
            handshake_timeout_ms: 8000,
            idle_timeout_ms: 60_000,
            ..Self::default()
        }
    }
}
