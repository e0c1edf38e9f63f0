//! Opens a TCP connection to a stream host and runs the client side of
//! the SOCKS5 exchange over it.

use crate::stanza::StreamHost;
use crate::{Error, Result};

use s5b_socksproto::{ClientHandshake, Error as SocksError};

use std::io::{Error as IoError, ErrorKind};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Connect to `host` and request the rendezvous named by `digest`.
///
/// On success the returned socket is ready to carry stream data.  The
/// whole operation, TCP connect included, is bounded by `deadline`.
pub(crate) async fn connect_stream_host(
    host: &StreamHost,
    digest: &str,
    deadline: Duration,
) -> Result<TcpStream> {
    match timeout(deadline, connect_notimeout(host, digest)).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout),
    }
}

/// As [`connect_stream_host`], but without a deadline.
async fn connect_notimeout(host: &StreamHost, digest: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect((host.addr.as_str(), host.port)).await?;
    debug!("connected to stream host {} at {}:{}", host.jid, host.addr, host.port);

    let mut handshake = ClientHandshake::new(digest);

    // The first step consumes no input: it just hands us the greeting.
    let first = handshake.handshake(&[])?;
    stream.write_all(&first.reply).await?;

    let mut inbuf = [0_u8; 1024];
    let mut n_read = 0;
    loop {
        // Read some more stuff.
        let n = stream.read(&mut inbuf[n_read..]).await?;
        if n == 0 {
            return Err(Error::Io(IoError::new(
                ErrorKind::UnexpectedEof,
                "stream host closed mid-handshake",
            )));
        }
        n_read += n;

        // Try to advance the handshake.
        let action = match handshake.handshake(&inbuf[..n_read]) {
            Err(SocksError::Truncated) => continue,
            Err(e) => return Err(e.into()),
            Ok(action) => action,
        };

        if action.drain > 0 {
            inbuf.copy_within(action.drain..n_read, 0);
            n_read -= action.drain;
        }
        if !action.reply.is_empty() {
            stream.write_all(&action.reply).await?;
        }
        if action.finished {
            break;
        }
    }

    Ok(stream)
}
