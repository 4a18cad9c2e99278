//! One-shot ident responder (RFC 1413).
//!
//! IRC servers commonly query port 113 on a connecting host to learn the
//! user's login. This responder answers exactly one query with the
//! configured username, then shuts down; it also shuts down after 60
//! seconds without a query.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::ClientError;

const IDENT_PORT: u16 = 113;
const IDENT_LINGER: Duration = Duration::from_secs(60);

/// Bind the ident port and serve a single query in the background.
///
/// Returns once the listener is bound; the reply itself happens
/// asynchronously. Start this before connecting so the server's query
/// finds the responder running.
///
/// # Errors
///
/// Propagates the bind failure (port taken, or unprivileged on systems
/// that restrict low ports).
pub(crate) async fn start(username: String) -> Result<(), ClientError> {
    let listener = TcpListener::bind(("0.0.0.0", IDENT_PORT)).await?;
    info!(port = IDENT_PORT, "ident server started");

    tokio::spawn(async move {
        match timeout(IDENT_LINGER, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!(%peer, "ident query accepted");
                if let Err(err) = answer_query(stream, &username).await {
                    debug!(%err, "ident query failed");
                }
            }
            Ok(Err(err)) => debug!(%err, "ident accept failed"),
            Err(_) => debug!("ident server timed out without a query"),
        }
        info!("ident server stopped");
    });

    Ok(())
}

async fn answer_query(stream: tokio::net::TcpStream, username: &str) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let query = line.trim();

    // Query form: `<clientPort> , <serverPort>`.
    let mut ports = query.split(',').map(str::trim);
    if let (Some(client_port), Some(server_port)) = (ports.next(), ports.next()) {
        let reply = format!(
            "{}, {} : USERID : UNIX : {}\r\n",
            client_port, server_port, username
        );
        write_half.write_all(reply.as_bytes()).await?;
        write_half.flush().await?;
        debug!(query, "ident query answered");
    } else {
        debug!(query, "malformed ident query ignored");
    }
    Ok(())
}
