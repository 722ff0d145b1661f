use crate::accounts::{ normalize_email, AccountStore };
use crate::agent::{ ResearchAgent, TurnOutcome, TurnPhase };
use crate::models::chat::Notice;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::session::Session;

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::net::TcpListener;
use tokio::sync::mpsc::{ self, UnboundedSender };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ ErrorResponse, Request, Response };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use hmac::{ Hmac, Mac };
use sha2::Sha256;
use chrono::Utc;
use url::form_urlencoded;

use log::{ debug, info, warn, error };
use futures::{ SinkExt, StreamExt };

type HmacSha256 = Hmac<Sha256>;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const MAX_CLOCK_SKEW_SECS: u64 = 300;
const CONNECTIONS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => panic!("connection rate must be non-zero"),
};

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(CONNECTIONS_PER_SECOND));
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing ts/sig")]
    Missing,
    #[error("timestamp out of range")]
    Expired,
    #[error("bad signature")]
    BadSignature,
}

/// Hex HMAC-SHA256 of the timestamp, keyed with the server API key.
pub fn sign_handshake(secret: &str, ts: &str) -> Result<String, HandshakeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| HandshakeError::BadSignature)?;
    mac.update(ts.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks the `ts`/`sig` query parameters of an upgrade request.
pub fn verify_handshake(query: &str, secret: &str, now: i64) -> Result<(), HandshakeError> {
    let params: HashMap<String, String> =
        form_urlencoded::parse(query.as_bytes()).into_owned().collect();

    let ts = params.get("ts").or_else(|| params.get("X-Api-Ts"));
    let sig = params.get("sig").or_else(|| params.get("X-Api-Sign"));
    let (Some(ts), Some(sig)) = (ts, sig) else {
        return Err(HandshakeError::Missing);
    };

    let ts_i: i64 = ts.parse().map_err(|_| HandshakeError::Expired)?;
    if now.abs_diff(ts_i) > MAX_CLOCK_SKEW_SECS {
        return Err(HandshakeError::Expired);
    }

    let expected = hex::decode(sig).map_err(|_| HandshakeError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| HandshakeError::BadSignature)?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&expected).map_err(|_| HandshakeError::BadSignature)
}

fn send_json(out: &UnboundedSender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if out.send(Message::Text(json)).is_err() {
                debug!("Client writer already closed, dropping message");
            }
        }
        Err(e) => error!("Failed to serialize server message: {}", e),
    }
}

fn send_notice(out: &UnboundedSender<Message>, notice: Notice) {
    send_json(out, &ServerMessage::from(notice));
}

/// Everything a connection needs to serve its session.
pub struct SessionHandler {
    agent: Arc<ResearchAgent>,
    accounts: Arc<dyn AccountStore>,
    admin_email: String,
}

impl SessionHandler {
    pub fn new(agent: Arc<ResearchAgent>, accounts: Arc<dyn AccountStore>, admin_email: String) -> Self {
        Self {
            agent,
            accounts,
            admin_email,
        }
    }

    fn session_state(session: &Session) -> ServerMessage {
        ServerMessage::Session {
            authenticated: session.is_authenticated(),
            email: session.user().map(str::to_string),
        }
    }

    fn send_status(&self, out: &UnboundedSender<Message>, phase: TurnPhase) {
        send_json(out, &ServerMessage::Status {
            phase: phase.name().to_string(),
            label: phase.label(self.agent.prompt_config()),
        });
    }

    /// Handles one client frame. Runs to completion before the next frame is read.
    pub async fn handle(&self, session: &mut Session, message: ClientMessage, out: &UnboundedSender<Message>) {
        match message {
            ClientMessage::Chat { content } => self.handle_chat(session, &content, out).await,
            ClientMessage::Register { email, password } => {
                self.handle_register(session, &email, &password, out).await
            }
            ClientMessage::Login { email, password } => {
                self.handle_login(session, &email, &password, out).await
            }
            ClientMessage::Logout => {
                info!("Session {} logged out", session.id());
                session.logout();
                send_json(out, &Self::session_state(session));
            }
            ClientMessage::Feedback { message } => self.handle_feedback(session, &message, out).await,
            ClientMessage::History => {
                send_json(out, &ServerMessage::History {
                    messages: session.transcript().messages().to_vec(),
                });
            }
        }
    }

    async fn handle_chat(&self, session: &mut Session, content: &str, out: &UnboundedSender<Message>) {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        let outcome = {
            let turn = self.agent.run_turn(session, content, Some(&progress_tx));
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    outcome = &mut turn => break outcome,
                    Some(phase) = progress_rx.recv() => self.send_status(out, phase),
                }
            }
        };
        while let Ok(phase) = progress_rx.try_recv() {
            self.send_status(out, phase);
        }

        match outcome {
            TurnOutcome::Completed(reply) => {
                for notice in reply.notices {
                    send_notice(out, notice);
                }
                send_json(out, &ServerMessage::Response {
                    content: reply.answer,
                    sources: reply.sources,
                    timestamp: Utc::now().timestamp(),
                });
            }
            TurnOutcome::Abandoned(reason) => {
                send_notice(out, self.agent.abandon_notice(reason));
            }
        }
    }

    async fn handle_register(
        &self,
        session: &mut Session,
        email: &str,
        password: &str,
        out: &UnboundedSender<Message>
    ) {
        let prompts = self.agent.prompt_config();
        let result = match normalize_email(email) {
            Ok(email) => self.accounts.register(&email, password).await.map(|_| email),
            Err(e) => Err(e),
        };
        match result {
            Ok(email) => {
                info!("Registered account {}", email);
                session.login(email);
                send_json(out, &Self::session_state(session));
            }
            Err(e) => {
                warn!("Registration failed for session {}: {}", session.id(), e);
                send_notice(out, Notice::error(prompts.account_error(&e.to_string())));
            }
        }
    }

    async fn handle_login(
        &self,
        session: &mut Session,
        email: &str,
        password: &str,
        out: &UnboundedSender<Message>
    ) {
        let prompts = self.agent.prompt_config();
        let email = match normalize_email(email) {
            Ok(email) => email,
            Err(_) => {
                send_notice(out, Notice::error(prompts.login_failed.clone()));
                return;
            }
        };
        match self.accounts.verify(&email, password).await {
            Ok(true) => {
                info!("Session {} logged in as {}", session.id(), email);
                session.login(email);
                send_json(out, &Self::session_state(session));
            }
            Ok(false) => {
                warn!("Failed login attempt for {}", email);
                send_notice(out, Notice::error(prompts.login_failed.clone()));
            }
            Err(e) => {
                error!("Account store error during login: {}", e);
                send_notice(out, Notice::error(prompts.account_error(&e.to_string())));
            }
        }
    }

    async fn handle_feedback(&self, session: &Session, message: &str, out: &UnboundedSender<Message>) {
        let prompts = self.agent.prompt_config();
        let Some(user) = session.user() else {
            send_notice(out, Notice::warning(prompts.login_required.clone()));
            return;
        };
        match self.accounts.submit_feedback(user, message).await {
            Ok(id) => {
                info!("Stored feedback #{} from {}", id, user);
                send_notice(out, Notice::info(prompts.feedback_received(&self.admin_email)));
            }
            Err(e) => {
                warn!("Feedback from {} rejected: {}", user, e);
                send_notice(out, Notice::error(prompts.account_error(&e.to_string())));
            }
        }
    }
}

pub async fn start_ws_server(
    addr: &str,
    handler: Arc<SessionHandler>,
    api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);
    if api_key.as_deref().map_or(true, str::is_empty) {
        info!("SERVER_API_KEY not set. Handshake signatures are not required.");
    }

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let handler = Arc::clone(&handler);
        let required_api_key = api_key.clone();

        tokio::spawn(async move {
            if let Err(e) = process_connection(peer, stream, handler, required_api_key).await {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    handler: Arc<SessionHandler>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Ok(response);
            }
        };

        let query = req.uri().query().unwrap_or("");
        match verify_handshake(query, secret, Utc::now().timestamp()) {
            Ok(()) => Ok(response),
            Err(e) => {
                warn!("Rejected handshake from {}: {}", peer, e);
                let mut res = ErrorResponse::new(Some(e.to_string()));
                *res.status_mut() = StatusCode::UNAUTHORIZED;
                Err(res)
            }
        }
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, handler).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

pub async fn handle_connection<S>(peer: SocketAddr, websocket: WebSocketStream<S>, handler: Arc<SessionHandler>)
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let (mut sink, mut rx) = websocket.split();
    let (tx, mut outbound) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = sink.send(message).await {
                error!("Error sending to {}: {}", peer, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = Session::new();
    info!("Assigned session {} to {}", session.id(), peer);
    send_json(&tx, &SessionHandler::session_state(&session));

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!("Message from {} exceeds size limit ({} > {})", peer, message.len(), MAX_MESSAGE_SIZE);
                    send_json(&tx, &ServerMessage::Error {
                        message: "Message too large".to_string(),
                    });
                    break;
                }

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_message) => {
                                handler.handle(&mut session, client_message, &tx).await;
                            }
                            Err(e) => {
                                error!("Failed to parse message from {}: {}", peer, e);
                                send_json(&tx, &ServerMessage::Error {
                                    message: format!("Failed to parse message: {}", e),
                                });
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).is_err() {
                            error!("Failed to queue pong for {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    info!(
        "WebSocket connection closed for {} (session {}, {} message(s))",
        peer,
        session.id(),
        session.transcript().len()
    );
}
