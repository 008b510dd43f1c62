//! Multicast DNS responder and DNS-SD service advertiser.
//!
//! This crate answers mDNS queries (RFC 6762) for a configured hostname and
//! advertises services via DNS-SD (RFC 6763). It does not resolve or browse;
//! it only responds.
//!
//! The usual entry point is [`responder::SyncResponder`], which owns the
//! multicast socket and is driven by polling
//! [`update`][responder::SyncResponder::update] from the application's own
//! loop (or by calling the blocking
//! [`listen`][responder::SyncResponder::listen]). The sans-I/O
//! [`responder::Responder`] underneath can be combined with other socket
//! types, which is what the `halloo-async` crate does.

use std::net::Ipv4Addr;

mod hex;

pub mod responder;
pub mod service;
pub mod wire;

/// The UDP port multicast DNS operates on.
pub const MDNS_PORT: u16 = 5353;

/// The IPv4 multicast group queries and responses are sent to.
pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Size of multicast DNS message buffers.
///
/// DNS messages are limited to 512 Bytes, but mDNS works entirely within a
/// local network, so it can use larger messages.
///
/// This constant is the size of packet receive buffers and does not have to
/// accomodate IP and UDP headers. It still does, because I cannot be
/// bothered.
pub const MDNS_BUFFER_SIZE: usize = 1500;

/// Default time-to-live of advertised records, in seconds.
pub const DEFAULT_TTL: u32 = 120;
