//! Async multicast DNS responder.
//!
//! Wraps the sans-I/O [`Responder`] from the `halloo` crate in an
//! [`async_io::Async`] socket, so it can be driven from any async executor.

use std::{
    io,
    net::{IpAddr, SocketAddr, UdpSocket},
    time::{Duration, Instant},
};

use async_io::{Async, Timer};
use futures_lite::future;

use halloo::{
    responder::Responder,
    service::{ServiceRecord, ServiceType, TxtData},
    wire::name::Label,
    MDNS_BUFFER_SIZE, MDNS_GROUP, MDNS_PORT,
};

/// Asynchronous mDNS responder.
pub struct AsyncResponder {
    resp: Responder,
    sock: Async<UdpSocket>,
}

impl AsyncResponder {
    /// Creates a responder advertising `addr` under the domain
    /// `hostname.local`.
    ///
    /// `hostname` should be different from the system host name, to avoid
    /// conflicts with other installed mDNS responders.
    pub fn new(hostname: Label, addr: IpAddr) -> io::Result<Self> {
        let resp = Responder::new(hostname, addr);
        let sock = Async::new(resp.create_socket()?)?;
        Ok(Self { resp, sock })
    }

    /// Adds another IP address to resolve the hostname to.
    pub fn add_address(&mut self, addr: IpAddr) {
        self.resp.add_address(addr);
    }

    /// Sets the time-to-live of all advertised records, in seconds.
    pub fn set_ttl(&mut self, ttl: u32) {
        self.resp.set_ttl(ttl);
    }

    /// Sets the board identifier published by
    /// [`AsyncResponder::enable_arduino`].
    pub fn set_board(&mut self, board: impl Into<String>) {
        self.resp.set_board(board);
    }

    /// Returns the registered services, in registration order.
    pub fn services(&self) -> &[ServiceRecord] {
        self.resp.services()
    }

    /// Registers a service, using the hostname as the instance name.
    pub fn add_service(&mut self, ty: ServiceType, port: u16) {
        self.resp.add_service(ty, port);
    }

    /// Registers a service with an explicit instance name and TXT metadata.
    pub fn add_service_with(
        &mut self,
        ty: ServiceType,
        instance: Label,
        port: u16,
        txt: TxtData,
    ) {
        self.resp.add_service_with(ty, instance, port, txt);
    }

    /// Registers the well-known `_arduino._tcp` IDE/flashing endpoint.
    pub fn enable_arduino(&mut self, port: u16, auth: bool) {
        self.resp.enable_arduino(port, auth);
    }

    /// Sends an unsolicited announcement of all records to the multicast
    /// group.
    pub async fn announce(&self) -> io::Result<()> {
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = self.resp.announcement(&mut buf, self.resp.ttl());
        self.sock
            .send_to(&buf[..len], SocketAddr::from((MDNS_GROUP, MDNS_PORT)))
            .await?;
        Ok(())
    }

    /// Announces the advertised records, then listens for and replies to
    /// incoming queries.
    ///
    /// The records are re-announced every half TTL, so caches never see them
    /// expire. This method will not return, except when an error occurs.
    pub async fn listen(&mut self) -> io::Result<()> {
        self.announce().await?;

        let refresh = Duration::from_secs(u64::from(self.resp.ttl() / 2).max(1));
        let mut deadline = Instant::now() + refresh;

        let mut recv_buf = [0; MDNS_BUFFER_SIZE];
        loop {
            let incoming = {
                let recv = async { self.sock.recv_from(&mut recv_buf).await.map(Some) };
                let tick = async {
                    Timer::at(deadline).await;
                    Ok(None)
                };
                future::or(recv, tick).await?
            };

            match incoming {
                Some((len, addr)) => {
                    let packet = &recv_buf[..len];
                    log::trace!("raw recv from {}: {:x?}", addr, packet);

                    let mut reply_buf = [0; MDNS_BUFFER_SIZE];
                    match self.resp.handle_packet(addr, packet, &mut reply_buf) {
                        Ok(Some(reply)) => {
                            self.sock
                                .send_to(&reply_buf[..reply.size()], reply.dest())
                                .await?;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::debug!("failed to handle packet: {}", e);
                        }
                    }
                }
                None => {
                    self.announce().await?;
                    deadline = Instant::now() + refresh;
                }
            }
        }
    }
}

impl Drop for AsyncResponder {
    fn drop(&mut self) {
        // Goodbye packet, best-effort: the inner socket is non-blocking, so
        // this either goes out immediately or not at all.
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = self.resp.announcement(&mut buf, 0);
        if let Err(e) = self
            .sock
            .get_ref()
            .send_to(&buf[..len], (MDNS_GROUP, MDNS_PORT))
        {
            log::debug!("failed to send goodbye packet: {}", e);
        }
    }
}
