//! WebSocket 스트림 연결.
//!
//! `tokio-tungstenite` 기반 수신 전용 연결. keepalive ping을 직접 보내고
//! pong이 제한 시간 안에 오지 않으면 연결 실패로 보고한다.
//! Socket.IO 엔드포인트는 Engine.IO 핸드셰이크/ping에 응답한다.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use linkwatch_core::config::{StreamEndpointConfig, StreamProtocol};
use linkwatch_core::error::CoreError;
use linkwatch_core::ports::stream::{StreamConnector, StreamSession};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 연결 타임아웃
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// WebSocket 연결기: `StreamConnector` 포트 구현
pub struct WsStreamConnector {
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl WsStreamConnector {
    /// 새 연결기 생성
    pub fn new(ping_interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            ping_interval,
            ping_timeout,
        }
    }
}

#[async_trait]
impl StreamConnector for WsStreamConnector {
    async fn connect(
        &self,
        endpoint: &StreamEndpointConfig,
    ) -> Result<Box<dyn StreamSession>, CoreError> {
        info!("WebSocket 연결: {}", endpoint.name);

        let (ws, _) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async(endpoint.url.as_str()),
        )
        .await
        .map_err(|_| CoreError::Stream("connection timeout".to_string()))?
        .map_err(|e| CoreError::Stream(e.to_string()))?;

        Ok(Box::new(WsStreamSession::new(
            ws,
            endpoint.protocol,
            self.ping_interval,
            self.ping_timeout,
        )))
    }
}

/// 수립된 WebSocket 연결
struct WsStreamSession {
    ws: WsStream,
    protocol: StreamProtocol,
    ping_interval: Duration,
    ping_timeout: Duration,
    next_ping: Instant,
    pong_deadline: Option<Instant>,
}

impl WsStreamSession {
    fn new(
        ws: WsStream,
        protocol: StreamProtocol,
        ping_interval: Duration,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            ws,
            protocol,
            ping_interval,
            ping_timeout,
            next_ping: Instant::now() + ping_interval,
            pong_deadline: None,
        }
    }

    async fn send(&mut self, message: Message) -> Result<(), CoreError> {
        self.ws
            .send(message)
            .await
            .map_err(|e| CoreError::Stream(e.to_string()))
    }
}

#[async_trait]
impl StreamSession for WsStreamSession {
    async fn next_message(&mut self) -> Option<Result<String, CoreError>> {
        loop {
            let deadline = self.pong_deadline.unwrap_or(self.next_ping);

            tokio::select! {
                frame = self.ws.next() => {
                    let message = match frame {
                        None => return None,
                        Some(Err(e)) => return Some(Err(CoreError::Stream(e.to_string()))),
                        Some(Ok(message)) => message,
                    };

                    match message {
                        Message::Text(text) => {
                            let text = text.to_string();
                            if self.protocol == StreamProtocol::Socketio {
                                match engine_io_frame(&text) {
                                    EngineIoFrame::Reply(reply) => {
                                        if let Err(e) = self.send(Message::text(reply.to_string())).await {
                                            return Some(Err(e));
                                        }
                                        continue;
                                    }
                                    EngineIoFrame::Control => continue,
                                    EngineIoFrame::Disconnect(reason) => {
                                        return Some(Err(CoreError::Stream(reason.to_string())));
                                    }
                                    EngineIoFrame::Data => {}
                                }
                            }
                            return Some(Ok(text));
                        }
                        Message::Binary(data) => {
                            return Some(Ok(format!("<binary {} bytes>", data.len())));
                        }
                        Message::Pong(_) => {
                            self.pong_deadline = None;
                        }
                        Message::Close(frame) => {
                            debug!("원격 종료 프레임 수신: {:?}", frame);
                            return None;
                        }
                        // Ping 응답은 tungstenite가 처리
                        _ => {}
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if self.pong_deadline.is_some() {
                        return Some(Err(CoreError::Stream("keepalive ping timeout".to_string())));
                    }
                    if let Err(e) = self.send(Message::Ping(Default::default())).await {
                        return Some(Err(e));
                    }
                    let now = Instant::now();
                    self.pong_deadline = Some(now + self.ping_timeout);
                    self.next_ping = now + self.ping_interval;
                }
            }
        }
    }
}

/// Engine.IO 텍스트 패킷 분류
#[derive(Debug, PartialEq, Eq)]
enum EngineIoFrame {
    /// 응답이 필요한 제어 패킷
    Reply(&'static str),
    /// 응답 없는 제어 패킷 (카운트 제외)
    Control,
    /// 원격 종료 (Engine.IO close 또는 네임스페이스 해제)
    Disconnect(&'static str),
    /// 애플리케이션 데이터
    Data,
}

fn engine_io_frame(text: &str) -> EngineIoFrame {
    match text.as_bytes().first() {
        // open → 기본 네임스페이스 connect
        Some(b'0') => EngineIoFrame::Reply("40"),
        Some(b'1') => EngineIoFrame::Disconnect("socket.io connection closed by remote"),
        // ping → pong
        Some(b'2') => EngineIoFrame::Reply("3"),
        Some(b'3') | Some(b'6') => EngineIoFrame::Control,
        Some(b'4') => match text.as_bytes().get(1) {
            Some(b'0') => EngineIoFrame::Control,
            Some(b'1') => EngineIoFrame::Disconnect("socket.io namespace disconnected"),
            _ => EngineIoFrame::Data,
        },
        _ => EngineIoFrame::Data,
    }
}
