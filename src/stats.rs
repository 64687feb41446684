//! 전송 통계

use std::time::{Duration, Instant};

/// 전송 하나(한 방향)의 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 전송한 패킷 수 (재전송 포함)
    pub packets_sent: u64,

    /// 재전송 횟수
    pub retransmissions: u64,

    /// 수신한 패킷 수
    pub packets_received: u64,

    /// 무시된 지난 ACK 수
    pub stale_acks: u64,

    /// 중복 수신 DATA 수
    pub duplicate_chunks: u64,

    /// 프로토콜 위반/범위 초과로 버린 패킷 수
    pub dropped_packets: u64,

    /// 페이로드 바이트 (고유 청크 기준)
    pub payload_bytes: u64,

    /// 시작 시간
    started_at: Instant,

    /// 종료 시간
    finished_at: Option<Instant>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            packets_sent: 0,
            retransmissions: 0,
            packets_received: 0,
            stale_acks: 0,
            duplicate_chunks: 0,
            dropped_packets: 0,
            payload_bytes: 0,
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    /// 종료 시각 기록
    pub fn finish(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Instant::now());
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }

    /// 처리량 (MB/s)
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.payload_bytes as f64 / secs / 1_000_000.0
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.packets_sent as f64
    }

    /// 한 줄 요약
    pub fn summary(&self) -> String {
        format!(
            "{} bytes, {:.2}s, {:.2} MB/s, sent={} (retransmit {:.1}%), recv={}, dup={}, stale_ack={}, dropped={}",
            self.payload_bytes,
            self.elapsed().as_secs_f64(),
            self.throughput_mbps(),
            self.packets_sent,
            self.retransmit_ratio() * 100.0,
            self.packets_received,
            self.duplicate_chunks,
            self.stale_acks,
            self.dropped_packets,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmit_ratio() {
        let mut stats = TransferStats::new();
        assert_eq!(stats.retransmit_ratio(), 0.0);

        stats.packets_sent = 10;
        stats.retransmissions = 2;
        assert!((stats.retransmit_ratio() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finish_freezes_elapsed() {
        let mut stats = TransferStats::new();
        stats.finish();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.elapsed(), first);
    }
}
