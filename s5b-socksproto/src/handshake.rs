//! Types to implement the two sides of the bytestream SOCKS5 exchange.

use crate::msg::{SocksAddr, SocksCmd, SocksRequest, SocksStatus};
use crate::reader::Reader;
use crate::{Error, Result};

/// Constant for "no authentication", the only method bytestreams use.
const NO_AUTHENTICATION: u8 = 0x00;

/// An action to take in response to a handshake message.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct Action {
    /// If nonzero, this many bytes should be drained from the
    /// peer's inputs.
    pub drain: usize,
    /// If nonempty, this reply should be sent to the peer.
    pub reply: Vec<u8>,
    /// If true, then this handshake is over, either successfully or not.
    pub finished: bool,
}

/// The stream-host side of an incoming SOCKS5 exchange.
///
/// To perform a handshake, call [`ServerHandshake::handshake`]
/// repeatedly with new inputs, until the resulting [`Action`] has
/// `finished` set to true; then take the request with
/// [`ServerHandshake::into_request`] and answer it with
/// [`SocksRequest::reply`].
#[derive(Clone, Debug)]
pub struct ServerHandshake {
    /// Current state of the handshake.  Each completed message
    /// advances the state.
    state: ServerState,
    /// Completed request, if the handshake has finished.
    request: Option<SocksRequest>,
}

/// Possible states for the server side of a handshake.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ServerState {
    /// Starting state: no messages have been handled yet.
    Initial,
    /// We've answered the greeting, and are waiting for the CONNECT
    /// request.
    WaitRequest,
    /// Ending state: the client has sent all its messages.
    ///
    /// (Note that we still need to send a reply.)
    Done,
}

impl ServerHandshake {
    /// Construct a new ServerHandshake in its initial state.
    pub fn new() -> Self {
        ServerHandshake {
            state: ServerState::Initial,
            request: None,
        }
    }

    /// Try to advance the handshake, given some peer input in `input`.
    ///
    /// If there isn't enough input, gives [`Error::Truncated`].  Other
    /// errors indicate a failure.
    ///
    /// On success, return an Action describing what to tell the peer,
    /// and how much of its input to consume.
    pub fn handshake(&mut self, input: &[u8]) -> Result<Action> {
        if input.is_empty() {
            return Err(Error::Truncated);
        }
        match (self.state, input[0]) {
            (ServerState::Initial, 5) => self.greeting(input),
            (ServerState::Initial, v) => Err(Error::BadProtocol(v)),
            (ServerState::WaitRequest, 5) => self.request(input),
            (ServerState::Done, _) => Err(Error::AlreadyFinished),
            (_, _) => Err(Error::Syntax),
        }
    }

    /// Handle the initial greeting and pick the authentication method.
    fn greeting(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let _version = r.take_u8()?;
        let nmethods = r.take_u8()?;
        let methods = r.take(nmethods as usize)?;

        if !methods.contains(&NO_AUTHENTICATION) {
            return Err(Error::NoSupport);
        }

        self.state = ServerState::WaitRequest;
        Ok(Action {
            drain: r.consumed(),
            reply: vec![5, NO_AUTHENTICATION],
            finished: false,
        })
    }

    /// Handle the CONNECT request carrying the rendezvous digest.
    fn request(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let version = r.take_u8()?;
        if version != 5 {
            return Err(Error::Syntax);
        }
        let cmd: SocksCmd = r.take_u8()?.into();
        let _reserved = r.take_u8()?;
        let addr = SocksAddr::take_from(&mut r)?;
        let port = r.take_u16()?;

        let request = SocksRequest::new(cmd, addr, port)?;

        self.state = ServerState::Done;
        self.request = Some(request);

        Ok(Action {
            drain: r.consumed(),
            reply: Vec::new(),
            finished: true,
        })
    }

    /// Return true if this handshake is finished.
    pub fn finished(&self) -> bool {
        self.state == ServerState::Done
    }

    /// Consume this handshake's state; if it finished successfully,
    /// return the peer's request.
    pub fn into_request(self) -> Option<SocksRequest> {
        self.request
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// The connecting side of a SOCKS5 exchange against a stream host.
///
/// The first call to [`ClientHandshake::handshake`] may be made with an
/// empty input; it produces the greeting to send.  Subsequent calls
/// consume the server's replies and produce the CONNECT request and,
/// eventually, a finished Action once the server has granted the
/// connection.
#[derive(Clone, Debug)]
pub struct ClientHandshake {
    /// Current state of the handshake.
    state: ClientState,
    /// The rendezvous digest we present as the target "hostname".
    hostname: String,
}

/// Possible states for the client side of a handshake.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ClientState {
    /// Starting state: nothing sent yet.
    Initial,
    /// Greeting sent; waiting for the server's method choice.
    WaitMethod,
    /// CONNECT request sent; waiting for the server's reply.
    WaitReply,
    /// Ending state: the server has granted the connection.
    Done,
}

impl ClientHandshake {
    /// Construct a new ClientHandshake that will request a connection
    /// to `hostname` (for a bytestream, the rendezvous digest).
    pub fn new(hostname: impl Into<String>) -> Self {
        ClientHandshake {
            state: ClientState::Initial,
            hostname: hostname.into(),
        }
    }

    /// Try to advance the handshake, given some server input in
    /// `input`.
    ///
    /// If there isn't enough input, gives [`Error::Truncated`].  Other
    /// errors indicate a failure, including [`Error::Rejected`] when
    /// the server turned the request down.
    pub fn handshake(&mut self, input: &[u8]) -> Result<Action> {
        match self.state {
            ClientState::Initial => self.greeting(),
            ClientState::WaitMethod => self.method(input),
            ClientState::WaitReply => self.reply(input),
            ClientState::Done => Err(Error::AlreadyFinished),
        }
    }

    /// Produce the greeting that opens the exchange.
    fn greeting(&mut self) -> Result<Action> {
        self.state = ClientState::WaitMethod;
        Ok(Action {
            drain: 0,
            reply: vec![5, 1, NO_AUTHENTICATION],
            finished: false,
        })
    }

    /// Handle the server's method choice and produce the CONNECT
    /// request.
    fn method(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let version = r.take_u8()?;
        if version != 5 {
            return Err(Error::BadProtocol(version));
        }
        let method = r.take_u8()?;
        if method != NO_AUTHENTICATION {
            return Err(Error::UnexpectedMethod(method));
        }

        let mut request = vec![5, SocksCmd::CONNECT.into(), 0];
        SocksAddr::Hostname(self.hostname.clone()).write_onto(&mut request)?;
        request.extend_from_slice(&0_u16.to_be_bytes());

        self.state = ClientState::WaitReply;
        Ok(Action {
            drain: r.consumed(),
            reply: request,
            finished: false,
        })
    }

    /// Handle the server's reply to our CONNECT request.
    fn reply(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let version = r.take_u8()?;
        if version != 5 {
            return Err(Error::BadProtocol(version));
        }
        let status: SocksStatus = r.take_u8()?.into();
        if status != SocksStatus::SUCCEEDED {
            return Err(Error::Rejected(status));
        }
        let _reserved = r.take_u8()?;
        // The bound address varies by ATYP; parse it to find where the
        // reply ends, then throw it away.
        let _addr = SocksAddr::take_from(&mut r)?;
        let _port = r.take_u16()?;

        self.state = ClientState::Done;
        Ok(Action {
            drain: r.consumed(),
            reply: Vec::new(),
            finished: true,
        })
    }

    /// Return true if this handshake is finished.
    pub fn finished(&self) -> bool {
        self.state == ClientState::Done
    }
}
