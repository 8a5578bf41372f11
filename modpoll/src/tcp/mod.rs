use tokio::net::TcpStream;

use crate::error::TransportError;

/// Connect to a device or gateway that carries RTU frames over a TCP socket
pub(crate) async fn connect(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let socket = TcpStream::connect((host, port))
        .await
        .map_err(|err| TransportError::Open(format!("{host}:{port}: {err}")))?;

    if let Err(err) = socket.set_nodelay(true) {
        tracing::warn!("unable to enable TCP_NODELAY: {}", err);
    }

    tracing::info!("connected to {}:{}", host, port);
    Ok(socket)
}
