use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::codec::PacketStream;
use super::messages::PacketType;
use super::types::{validate_process_port, MAX_PROCESS_PORT, MIN_PROCESS_PORT};
use super::{flooding, handshake, heartbeat};
use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::router::Router;

/// Bind the configured process port, or the first free one in the process range.
pub async fn bind_listener(config: &RouterConfig) -> Result<(TcpListener, u16)> {
    if let Some(port) = config.process_port {
        validate_process_port(port)?;
        let listener = TcpListener::bind((config.process_ip.as_str(), port)).await?;
        return Ok((listener, port));
    }

    for port in MIN_PROCESS_PORT..=MAX_PROCESS_PORT {
        match TcpListener::bind((config.process_ip.as_str(), port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => debug!("Port {} unavailable: {}", port, e),
        }
    }
    Err(RouterError::NoListeningPort {
        min: MIN_PROCESS_PORT,
        max: MAX_PROCESS_PORT,
    })
}

/// Accept connections forever, one handler task per connection.
pub fn spawn(router: Router, listener: TcpListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "{} listening on {}",
            router.simulated_ip(),
            router.description().process_addr()
        );
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    debug!("Connection from {}", addr);
                    let router = router.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(&router, socket).await {
                            if e.is_transient() {
                                warn!("Connection from {} dropped: {}", addr, e);
                            } else {
                                error!("Error handling connection from {}: {}", addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

/// Dispatch the first packet of an inbound connection.
pub async fn handle_connection(router: &Router, socket: TcpStream) -> Result<()> {
    socket.set_nodelay(true)?;
    let mut stream = PacketStream::new(socket, router.io_timeout());
    let packet = stream.recv().await?;

    match packet.packet_type {
        PacketType::Hello | PacketType::Connect => {
            handshake::respond(router, stream, packet).await
        }
        PacketType::LsaUpdate => {
            flooding::handle_lsa_update(router, &packet).await?;
            Ok(())
        }
        PacketType::Heartbeat => heartbeat::answer_heartbeat(router, &mut stream, &packet).await,
        PacketType::Disconnect => {
            info!("received DISCONNECT from {}", packet.src_ip);
            router.remove_neighbor(&packet.src_ip).await?;
            Ok(())
        }
        PacketType::NoPortsAvailable => Err(RouterError::UnexpectedPacket {
            expected: "HELLO, LSAUPDATE, HEARTBEAT or DISCONNECT",
            received: packet.packet_type,
        }),
    }
}
