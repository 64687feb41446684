//! 세션 관리자
//!
//! - `establish`: 요청 측 핸드쉐이크 (COMMAND -> OK(포트) -> OK/ERROR)
//! - `Responder`: well-known 포트 리스너, 전송마다 전용 포트와 태스크를 할당
//! - `Registry`: 클라이언트 주소 -> 세션 매핑을 소유하는 액터

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

use crate::link::Link;
use crate::message::{reason, CommandMessage, Packet, PacketType};
use crate::receiver::Receiver;
use crate::sender::SenderEngine;
use crate::transform::Transform;
use crate::{Config, Error, Result, MAX_PACKET_SIZE};

/// 요청 측 핸드쉐이크
///
/// 성공 시 이 전송에 할당된 전용 주소를 반환한다.
pub async fn establish(
    socket: &Arc<UdpSocket>,
    server: SocketAddr,
    command: &CommandMessage,
    config: &Config,
) -> Result<SocketAddr> {
    let request = Packet::command(&command.to_text())?;

    // 1단계: well-known 주소에서 전용 포트 안내
    let mut rendezvous = Link::new(socket.clone(), server);
    let reply = exchange(&mut rendezvous, &request, config, "COMMAND", true).await?;
    if reply.packet_type == PacketType::Error {
        return Err(Error::Rejected {
            reason: reply.text(),
        });
    }
    let port = reply.redirect_port().ok_or(Error::ProtocolViolation {
        state: "HANDSHAKE",
        packet_type: "OK",
    })?;

    // 2단계: 전용 주소에서 판정 (유실 시 COMMAND를 전용 주소로 재전송)
    let dedicated = SocketAddr::new(server.ip(), port);
    let mut session = Link::new(socket.clone(), dedicated);
    let verdict = exchange(&mut session, &request, config, "VERDICT", false).await?;

    match verdict.packet_type {
        PacketType::Ok => {
            info!("세션 수립: {} ({})", dedicated, command.mode);
            Ok(dedicated)
        }
        _ => Err(Error::Rejected {
            reason: verdict.text(),
        }),
    }
}

/// OK 또는 ERROR를 받을 때까지 요청 재전송
async fn exchange(
    link: &mut Link,
    request: &Packet,
    config: &Config,
    step: &'static str,
    send_first: bool,
) -> Result<Packet> {
    let attempts = config.attempts_per_step();

    for attempt in 0..attempts {
        if send_first || attempt > 0 {
            if attempt > 0 {
                warn!("{} 재전송 -> {} ({}/{})", step, link.peer(), attempt, attempts - 1);
            }
            link.send(request).await?;
        }

        let deadline = Instant::now() + config.handshake_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match link.recv_timeout(remaining).await? {
                None => break,
                Some(packet) if matches!(packet.packet_type, PacketType::Ok | PacketType::Error) => {
                    return Ok(packet);
                }
                Some(packet) => {
                    debug!("핸드쉐이크 중 무시: {}", packet.packet_type.name());
                }
            }
        }
    }

    Err(Error::TransferTimeout { step, attempts })
}

/// 레지스트리에 등록된 세션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub session_id: u64,
    pub port: u16,

    /// 세션을 만든 COMMAND 원문 (중복 판별용)
    pub command: String,
}

enum RegistryCommand {
    Register {
        client: SocketAddr,
        port: u16,
        command: String,
        reply: oneshot::Sender<u64>,
    },
    Lookup {
        client: SocketAddr,
        reply: oneshot::Sender<Option<SessionEntry>>,
    },
    Release {
        client: SocketAddr,
        session_id: u64,
    },
    ActiveCount {
        reply: oneshot::Sender<usize>,
    },
}

/// 세션 레지스트리 핸들
///
/// 매핑과 세션 ID 카운터는 액터 태스크 하나만 소유한다.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::Sender<RegistryCommand>,
}

impl Registry {
    /// 액터 태스크 시작 (모든 핸들이 drop되면 종료)
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(64);

        tokio::spawn(async move {
            let mut sessions: HashMap<SocketAddr, SessionEntry> = HashMap::new();
            let mut next_id = 1u64;

            while let Some(command) = rx.recv().await {
                match command {
                    RegistryCommand::Register {
                        client,
                        port,
                        command,
                        reply,
                    } => {
                        let session_id = next_id;
                        next_id += 1;
                        sessions.insert(
                            client,
                            SessionEntry {
                                session_id,
                                port,
                                command,
                            },
                        );
                        let _ = reply.send(session_id);
                    }
                    RegistryCommand::Lookup { client, reply } => {
                        let _ = reply.send(sessions.get(&client).cloned());
                    }
                    RegistryCommand::Release { client, session_id } => {
                        // 같은 주소의 새 세션은 건드리지 않음
                        if sessions.get(&client).map(|e| e.session_id) == Some(session_id) {
                            sessions.remove(&client);
                        }
                    }
                    RegistryCommand::ActiveCount { reply } => {
                        let _ = reply.send(sessions.len());
                    }
                }
            }

            debug!("레지스트리 종료");
        });

        Self { tx }
    }

    /// 세션 등록, 새 세션 ID 반환
    pub async fn register(&self, client: SocketAddr, port: u16, command: String) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Register {
            client,
            port,
            command,
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ChannelError)
    }

    pub async fn lookup(&self, client: SocketAddr) -> Result<Option<SessionEntry>> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Lookup { client, reply }).await?;
        rx.await.map_err(|_| Error::ChannelError)
    }

    pub async fn release(&self, client: SocketAddr, session_id: u64) -> Result<()> {
        self.request(RegistryCommand::Release { client, session_id })
            .await
    }

    pub async fn active_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::ActiveCount { reply }).await?;
        rx.await.map_err(|_| Error::ChannelError)
    }

    async fn request(&self, command: RegistryCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::ChannelError)
    }
}

/// well-known 포트 응답자 (서버 측)
pub struct Responder {
    config: Config,
    socket: Arc<UdpSocket>,
    transform: Arc<dyn Transform>,
    registry: Registry,

    /// 업로드 원본 저장 디렉토리 (선택)
    storage: Option<PathBuf>,

    shutdown: Notify,
}

impl Responder {
    /// well-known 주소에 바인딩
    pub async fn bind(
        addr: SocketAddr,
        config: Config,
        transform: Arc<dyn Transform>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("응답자 바인딩: {}", socket.local_addr()?);

        Ok(Self {
            config,
            socket: Arc::new(socket),
            transform,
            registry: Registry::spawn(),
            storage: None,
            shutdown: Notify::new(),
        })
    }

    /// 업로드 원본을 저장할 디렉토리 지정
    pub fn with_storage(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage = Some(dir.into());
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 리스너 루프 정지
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// 리스너 루프 (stop 호출 시 반환)
    ///
    /// COMMAND는 한 번에 하나씩 처리하고, 수락된 전송마다 태스크를 띄운다.
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];

        loop {
            let (len, addr) = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("응답자 종료");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => received?,
            };

            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("잘못된 데이터그램 폐기 ({}): {}", addr, e);
                    continue;
                }
            };

            if let Err(e) = self.handle(packet, addr).await {
                warn!("요청 처리 실패 ({}): {}", addr, e);
            }
        }
    }

    async fn handle(&self, packet: Packet, client: SocketAddr) -> Result<()> {
        if packet.packet_type != PacketType::Command {
            warn!(
                "well-known 포트에 {} 패킷 수신 ({}): 거부",
                packet.packet_type.name(),
                client
            );
            self.reply(&Packet::error(reason::PROTOCOL_VIOLATION), client)
                .await?;
            return Ok(());
        }

        let text = packet.text();

        if let Some(entry) = self.registry.lookup(client).await? {
            if entry.command == text {
                debug!("중복 COMMAND ({}): 포트 {} 재안내", client, entry.port);
                self.reply(&Packet::redirect(entry.port), client).await?;
            } else {
                warn!("진행 중인 세션이 있는 주소의 새 COMMAND ({}): 거부", client);
                self.reply(&Packet::error(reason::PROTOCOL_VIOLATION), client)
                    .await?;
            }
            return Ok(());
        }

        let ip = self.socket.local_addr()?.ip();
        let dedicated = Arc::new(UdpSocket::bind(SocketAddr::new(ip, 0)).await?);
        let port = dedicated.local_addr()?.port();

        let session_id = self.registry.register(client, port, text.clone()).await?;
        self.reply(&Packet::redirect(port), client).await?;
        info!("세션 #{} 할당: {} -> 포트 {}", session_id, client, port);

        let session = Session {
            id: session_id,
            client,
            command: text,
            link: Link::new(dedicated, client),
            config: self.config.clone(),
            transform: self.transform.clone(),
            storage: self.storage.clone(),
            registry: self.registry.clone(),
        };
        tokio::spawn(session.run());

        Ok(())
    }

    async fn reply(&self, packet: &Packet, client: SocketAddr) -> Result<()> {
        self.socket.send_to(&packet.encode(), client).await?;
        Ok(())
    }
}

/// 전송 하나를 처리하는 세션 태스크 상태
struct Session {
    id: u64,
    client: SocketAddr,
    command: String,
    link: Link,
    config: Config,
    transform: Arc<dyn Transform>,
    storage: Option<PathBuf>,
    registry: Registry,
}

impl Session {
    async fn run(mut self) {
        match self.serve().await {
            Ok(()) => info!("세션 #{} 완료 ({})", self.id, self.client),
            Err(e) if e.is_user_visible() => warn!("세션 #{} 실패 ({}): {}", self.id, self.client, e),
            Err(e) => debug!("세션 #{} 종료 ({}): {}", self.id, self.client, e),
        }

        if let Err(e) = self.registry.release(self.client, self.id).await {
            debug!("세션 #{} 해제 실패: {}", self.id, e);
        }
    }

    async fn serve(&mut self) -> Result<()> {
        let command = match self.verdict() {
            Ok(command) => command,
            Err(code) => {
                let refusal = Packet::error(code);
                self.link.send(&refusal).await?;
                self.repeat_verdict(&refusal).await?;
                return Err(Error::Rejected {
                    reason: code.to_string(),
                });
            }
        };

        let accepted = Packet::accepted();
        self.link.send(&accepted).await?;

        let mut receiver = Receiver::new(&mut self.link, &self.config);
        let upload = receiver.receive(Some(&accepted)).await?;

        if let Some(dir) = &self.storage {
            let path = crate::client::store_file(dir, &upload.filename, &upload.data).await?;
            info!("세션 #{} 원본 저장: {:?}", self.id, path);
        }

        if upload.mode != command.mode {
            warn!(
                "세션 #{}: METADATA 모드({})가 COMMAND 모드({})와 다름",
                self.id, upload.mode, command.mode
            );
        }

        let transform = self.transform.clone();
        let mode = command.mode.clone();
        let filename = upload.filename.clone();
        let data = upload.data.clone();
        let converted = tokio::task::spawn_blocking(move || transform.transform(&filename, &mode, &data))
            .await
            .map_err(|_| Error::ChannelError)?;

        let output = match converted {
            Ok(output) => output,
            Err(e) => {
                receiver.abort_with(reason::CONVERSION_FAILED).await?;
                return Err(e.into());
            }
        };

        // 업로드 COMPLETE (서버는 여기서 머무르지 않음)
        receiver.complete(&upload.filename, false).await?;
        drop(receiver);

        info!(
            "세션 #{} 변환 완료: {} -> {} ({} bytes)",
            self.id,
            upload.filename,
            output.filename,
            output.data.len()
        );

        let mut sender = SenderEngine::new(&mut self.link, &self.config);
        sender
            .send(&output.filename, &command.mode, Bytes::from(output.data))
            .await
    }

    /// COMMAND 검증. 실패 시 와이어 사유 코드
    fn verdict(&self) -> std::result::Result<CommandMessage, &'static str> {
        let command = CommandMessage::parse(&self.command).map_err(|e| match e {
            Error::InvalidCommand(code) => code,
            _ => reason::INVALID_COMMAND,
        })?;

        if !self.transform.supports(&command.mode) {
            return Err(reason::UNSUPPORTED_FORMAT);
        }
        Ok(command)
    }

    /// 거부 판정 후 잠시 남아 재전송된 COMMAND에 같은 판정을 반복
    async fn repeat_verdict(&mut self, refusal: &Packet) -> Result<()> {
        let deadline = Instant::now() + self.config.verdict_linger();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            match self.link.recv_timeout(remaining).await? {
                None => return Ok(()),
                Some(packet) if packet.packet_type == PacketType::Command => {
                    self.link.send(refusal).await?;
                }
                Some(_) => {}
            }
        }
    }
}
