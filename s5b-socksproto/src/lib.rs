//! Implements the subset of SOCKS5 spoken by XMPP SOCKS5 bytestreams
//! (XEP-0065).
//!
//! XEP-0065 borrows the SOCKS5 CONNECT exchange from
//! [RFC 1928](https://tools.ietf.org/html/rfc1928) and bends it into a
//! rendezvous mechanism: the "hostname" in the CONNECT request is not a
//! hostname at all, but a SHA-1 digest that identifies one half of a
//! pending stream, and the port is always zero.  Only the
//! "no authentication" method is ever negotiated.
//!
//! This crate hides the byte-level details behind two stateful
//! handshake types, one per side of the exchange:
//!
//!   * [`ServerHandshake`] implements the stream-host side: feed it
//!     bytes from an incoming connection until it yields a
//!     [`SocksRequest`], then answer with [`SocksRequest::reply`].
//!   * [`ClientHandshake`] implements the connecting side: it emits the
//!     greeting and CONNECT request and checks the replies.
//!
//! Neither type performs I/O.  Both consume input through a
//! `handshake()` method that returns an [`Action`] telling the caller
//! how many bytes were used and what (if anything) to send back.
//!
//! The [`digest`] module derives the rendezvous digest itself.

#![deny(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::await_holding_lock)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::large_stack_arrays)]
#![warn(clippy::manual_ok_or)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::option_option)]
#![warn(clippy::rc_buffer)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::trait_duplication_in_bounds)]
#![warn(clippy::unseparated_literal_suffix)]

pub mod digest;
mod err;
mod handshake;
mod msg;
mod reader;

pub use err::Error;
pub use handshake::{Action, ClientHandshake, ServerHandshake};
pub use msg::{SocksAddr, SocksCmd, SocksRequest, SocksStatus};

/// A Result type for the s5b_socksproto crate.
pub type Result<T> = std::result::Result<T, Error>;
