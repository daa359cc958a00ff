//! SOCKS5 front-end (CONNECT only): hand-rolled greeting/request/reply
//! framing over raw sockets.

use std::sync::Arc;

use notetun_router::{Router, TunnelConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SOCKS_VERSION: u8 = 5;
const AUTH_NONE: u8 = 0;
const CMD_CONNECT: u8 = 1;
const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

pub async fn serve(router: Arc<Router>, listener: TcpListener, tunnel_cfg: Arc<TunnelConfig>) {
    tracing::info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "SOCKS5 proxy listening");
    loop {
        match listener.accept().await {
            Ok((socket, _addr)) => {
                let router = router.clone();
                let tunnel_cfg = tunnel_cfg.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(router, socket, tunnel_cfg).await {
                        tracing::debug!(error = %e, "SOCKS5 connection ended with error");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "accept failed on SOCKS5 listener"),
        }
    }
}

async fn handle_connection(
    router: Arc<Router>,
    mut socket: TcpStream,
    tunnel_cfg: Arc<TunnelConfig>,
) -> anyhow::Result<()> {
    if !handle_greeting(&mut socket).await? {
        return Ok(());
    }

    let Some((cmd, host, port)) = handle_request(&mut socket).await? else {
        return Ok(());
    };

    if cmd != CMD_CONNECT {
        send_reply(&mut socket, 7).await?; // command not supported
        return Ok(());
    }

    match notetun_router::client_setup(&router, &host, port).await {
        Ok(request_id) => {
            send_reply(&mut socket, 0).await?;
            notetun_router::run_client_tunnel(router, &tunnel_cfg, request_id, socket).await;
        }
        Err(e) => {
            tracing::warn!(host, port, error = %e, "SOCKS5 CONNECT tunnel setup failed");
            send_reply(&mut socket, 4).await?; // host unreachable
        }
    }
    Ok(())
}

async fn handle_greeting(socket: &mut TcpStream) -> anyhow::Result<bool> {
    let mut header = [0u8; 2];
    socket.read_exact(&mut header).await?;
    let (version, nmethods) = (header[0], header[1]);
    if version != SOCKS_VERSION {
        return Ok(false);
    }

    let mut methods = vec![0u8; nmethods as usize];
    socket.read_exact(&mut methods).await?;

    if !methods.contains(&AUTH_NONE) {
        socket.write_all(&[SOCKS_VERSION, 0xFF]).await?;
        return Ok(false);
    }

    socket.write_all(&[SOCKS_VERSION, AUTH_NONE]).await?;
    Ok(true)
}

async fn handle_request(socket: &mut TcpStream) -> anyhow::Result<Option<(u8, String, u16)>> {
    let mut header = [0u8; 4];
    socket.read_exact(&mut header).await?;
    let (version, cmd, _rsv, atyp) = (header[0], header[1], header[2], header[3]);
    if version != SOCKS_VERSION {
        return Ok(None);
    }

    let dest_addr = match atyp {
        ATYP_IPV4 => {
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await?;
            std::net::Ipv4Addr::from(buf).to_string()
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            socket.read_exact(&mut len_buf).await?;
            let mut buf = vec![0u8; len_buf[0] as usize];
            socket.read_exact(&mut buf).await?;
            String::from_utf8_lossy(&buf).into_owned()
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 16];
            socket.read_exact(&mut buf).await?;
            std::net::Ipv6Addr::from(buf).to_string()
        }
        _ => {
            send_reply(socket, 8).await?; // address type not supported
            return Ok(None);
        }
    };

    let mut port_buf = [0u8; 2];
    socket.read_exact(&mut port_buf).await?;
    let dest_port = u16::from_be_bytes(port_buf);

    Ok(Some((cmd, dest_addr, dest_port)))
}

async fn send_reply(socket: &mut TcpStream, status: u8) -> anyhow::Result<()> {
    let mut reply = vec![SOCKS_VERSION, status, 0, ATYP_IPV4];
    reply.extend_from_slice(&[0, 0, 0, 0]); // bind addr 0.0.0.0
    reply.extend_from_slice(&[0, 0]); // bind port 0
    socket.write_all(&reply).await?;
    Ok(())
}
