use std::net::SocketAddr;

use cosmic::{ClientId, EntityId};

#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnecting {
        addr: SocketAddr,
    },
    ClientConnected {
        client_id: ClientId,
        addr: SocketAddr,
        character: EntityId,
    },
    ClientDisconnected {
        client_id: ClientId,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
    ShotJudged {
        client_id: ClientId,
        target: Option<EntityId>,
        step: Option<u32>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Shutdown => "dropped at shutdown",
        }
    }
}

impl ServerEvent {
    pub fn log(&self) {
        match self {
            ServerEvent::ClientConnecting { addr } => {
                log::debug!("connection request from {addr}");
            }
            ServerEvent::ClientConnected {
                client_id,
                addr,
                character,
            } => log::info!("client {client_id} connected from {addr} as {character}"),
            ServerEvent::ClientDisconnected { client_id, reason } => {
                log::info!("client {client_id} {}", reason.as_str());
            }
            ServerEvent::ConnectionDenied { addr, reason } => {
                log::warn!("denied {addr}: {reason}");
            }
            ServerEvent::ShotJudged {
                client_id,
                target: Some(target),
                step: Some(step),
            } => log::info!("client {client_id} hit {target} as seen at step {step}"),
            ServerEvent::ShotJudged { client_id, .. } => {
                log::debug!("client {client_id} missed");
            }
            ServerEvent::Error { message } => log::error!("{message}"),
        }
    }
}
