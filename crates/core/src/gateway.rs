//! HTTP ingress for the gateway role.
//!
//! A viewer asks for `GET /rtp/<host>:<port>/<path> HTTP/1.x`; the
//! connection is handed to a [`PlaySession`] against
//! `rtsp://<host>:<port>/<path>` and becomes the response body. Any other
//! request is closed without a response.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::StreamTarget;
use crate::protocol::request::split_head;
use crate::server::ServerConfig;
use crate::session::PlaySession;
use crate::transport::tcp::{HTTP_REQUEST_LIMIT, MessageReader};

pub use crate::session::worker::HTTP_OK_HEADER;

/// Serve one accepted HTTP connection until its stream ends.
pub fn handle_client(stream: TcpStream, peer: SocketAddr, config: &Arc<ServerConfig>) {
    let target = match read_target(&stream, config) {
        Ok(target) => target,
        Err(e) => {
            tracing::debug!(%peer, error = %e, "rejecting HTTP request");
            return;
        }
    };

    tracing::info!(%peer, upstream = %target, "viewer connected");

    if let Err(e) = PlaySession::new(target.clone(), config.clone()).run(stream) {
        tracing::warn!(%peer, upstream = %target, error = %e, "session failed");
    }

    tracing::info!(%peer, upstream = %target, "viewer disconnected");
}

fn read_target(stream: &TcpStream, config: &ServerConfig) -> Result<StreamTarget> {
    stream.set_read_timeout(config.control_timeout)?;
    let raw = MessageReader::new(stream, HTTP_REQUEST_LIMIT)
        .read_message()?
        .ok_or(RtspError::parse(ParseErrorKind::EmptyMessage))?;
    stream.set_read_timeout(None)?;
    stream.set_write_timeout(config.control_timeout)?;
    parse_request(&raw)
}

/// Map an HTTP request head to the upstream stream it names.
///
/// Only `GET` over HTTP/1.x with the `/rtp/` shorthand is accepted.
pub fn parse_request(raw: &[u8]) -> Result<StreamTarget> {
    let (head, _) = split_head(raw)?;
    let line = head
        .lines()
        .next()
        .ok_or(RtspError::parse(ParseErrorKind::EmptyMessage))?;

    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(RtspError::parse(ParseErrorKind::InvalidRequestLine));
    };

    if method != "GET" || !version.starts_with("HTTP/1.") {
        return Err(RtspError::parse(ParseErrorKind::InvalidRequestLine));
    }

    StreamTarget::from_shorthand(target)
}
