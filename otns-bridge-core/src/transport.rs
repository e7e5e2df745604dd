use anyhow::{Context, Result, bail};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::event::Event;

/// UDP endpoint owned by one node.
///
/// The visualizer identifies the sender of an event by its source port, so
/// each node binds `server_port + node_id` on the local host and sends to the
/// fixed server address.
#[derive(Debug)]
pub struct Transport {
    node_id: u32,
    socket: UdpSocket,
    dest: SocketAddr,
}

impl Transport {
    pub async fn bind(local_host: IpAddr, server: SocketAddr, node_id: u32) -> Result<Self> {
        let port = source_port(server.port(), node_id)?;
        let source = SocketAddr::new(local_host, port);
        let socket = UdpSocket::bind(source)
            .await
            .with_context(|| format!("Failed to bind node {node_id} event socket on {source}"))?;

        debug!("Node {node_id} socket from {source} to {server}");

        Ok(Self {
            node_id,
            socket,
            dest: server,
        })
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one event datagram
    pub async fn send(&self, event: &Event) -> Result<()> {
        let bytes = event.encode()?;
        self.socket
            .send_to(&bytes, self.dest)
            .await
            .with_context(|| format!("Failed to send event from node {}", self.node_id))?;
        Ok(())
    }

    /// Releases the bound port
    pub fn close(self) {
        debug!("Closing node {} socket", self.node_id);
    }
}

/// Source port for a node's event socket
pub fn source_port(server_port: u16, node_id: u32) -> Result<u16> {
    match u32::from(server_port)
        .checked_add(node_id)
        .and_then(|port| u16::try_from(port).ok())
    {
        Some(port) => Ok(port),
        None => bail!("Node id {node_id} does not fit above event port {server_port}"),
    }
}

/// Picks the local address the system would use to reach `server`.
///
/// No packet is sent: connecting a UDP socket only selects a route.
pub async fn local_host_for(server: SocketAddr) -> Result<IpAddr> {
    if server.ip().is_loopback() {
        return Ok(server.ip());
    }

    let unspecified = match server {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
    };
    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
    socket
        .connect(server)
        .await
        .with_context(|| format!("No route to visualizer at {server}"))?;
    Ok(socket.local_addr()?.ip())
}
