//! The multicast DNS responder.
//!
//! [`Responder`] holds the advertised names and service registry and turns
//! incoming query packets into reply packets, without performing any I/O
//! itself. [`SyncResponder`] owns the multicast socket on top of it and is
//! driven either by polling [`SyncResponder::update`] from a caller-owned
//! loop, or by handing the loop to [`SyncResponder::listen`].

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    time::Duration,
};

use bitflags::bitflags;
use socket2::{Domain, Protocol, Socket, Type as SockType};

use crate::{
    hex::Hex,
    service::{ServiceRecord, ServiceType, Transport, TxtData},
    wire::{
        self,
        decoder::{MessageDecoder, Question},
        encoder::{self, MessageEncoder},
        name::{DomainName, Label},
        rdata::{RecordData, A, AAAA, PTR, SRV},
        Class, Header, Opcode, RCode, Type,
    },
    DEFAULT_TTL, MDNS_BUFFER_SIZE, MDNS_GROUP, MDNS_PORT,
};

/// TTL used in replies to legacy unicast queriers, which are not
/// mDNS-aware and must not cache our records for long (RFC 6762 §6.7).
const LEGACY_TTL: u32 = 10;

bitflags! {
    /// The record kinds a reply to a single question has to carry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ReplySet: u8 {
        /// IPv4 addresses of the advertised hostname.
        const HOST_A = 1 << 0;
        /// IPv6 addresses of the advertised hostname.
        const HOST_AAAA = 1 << 1;
        /// Instance pointers for a browsed service type.
        const SERVICE_PTR = 1 << 2;
        /// Host and port of a service instance.
        const INSTANCE_SRV = 1 << 3;
        /// Metadata of a service instance.
        const INSTANCE_TXT = 1 << 4;
        /// Service type enumeration (`_services._dns-sd._udp`).
        const TYPE_ENUM_PTR = 1 << 5;
    }
}

/// An owned record along with its owner name and cache-flush eligibility.
type RecordEntry = (DomainName, RecordData<'static>, bool);

fn push_unique(list: &mut Vec<RecordEntry>, entry: RecordEntry) {
    if !list.contains(&entry) {
        list.push(entry);
    }
}

/// An encoded reply produced by [`Responder::handle_packet`], ready to be
/// sent to [`Reply::dest`].
#[derive(Debug)]
pub struct Reply {
    size: usize,
    dest: SocketAddr,
}

impl Reply {
    /// Number of bytes of the reply buffer that were filled.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Where to send the reply: the sender for unicast replies, the
    /// multicast group otherwise.
    #[inline]
    pub fn dest(&self) -> SocketAddr {
        self.dest
    }
}

/// mDNS responder state: advertised hostname, addresses, and services.
///
/// This type does not perform I/O. It can answer query packets through
/// [`Responder::handle_packet`] and produce announcement packets through
/// [`Responder::announcement`], which makes it usable from both the blocking
/// [`SyncResponder`] and async wrappers.
pub struct Responder {
    hostname: Label,
    /// `<hostname>.local`
    host_domain: DomainName,
    /// `local`
    parent: DomainName,
    /// `_services._dns-sd._udp.local`
    enum_domain: DomainName,
    addrs: Vec<IpAddr>,
    services: Vec<ServiceRecord>,
    ttl: u32,
    board: String,
}

impl Responder {
    /// Creates a responder advertising `addr` under the domain
    /// `hostname.local`.
    ///
    /// `hostname` should be different from the system host name, to avoid
    /// conflicts with other installed mDNS responders.
    pub fn new(hostname: Label, addr: IpAddr) -> Self {
        let parent = DomainName::from_str("local").unwrap();
        let mut host_domain = DomainName::from_iter([&hostname]);
        host_domain.extend(&parent);

        Self {
            hostname,
            host_domain,
            parent,
            enum_domain: DomainName::from_str("_services._dns-sd._udp.local").unwrap(),
            addrs: vec![addr],
            services: Vec::new(),
            ttl: DEFAULT_TTL,
            board: "generic".into(),
        }
    }

    /// Returns the advertised hostname.
    #[inline]
    pub fn hostname(&self) -> &Label {
        &self.hostname
    }

    /// Returns the domain the hostname is advertised under
    /// (`<hostname>.local`).
    #[inline]
    pub fn domain(&self) -> &DomainName {
        &self.host_domain
    }

    /// Adds another IP address to resolve the hostname to.
    pub fn add_address(&mut self, addr: IpAddr) {
        if !self.addrs.contains(&addr) {
            self.addrs.push(addr);
        }
    }

    /// Sets the time-to-live of all advertised records, in seconds.
    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Sets the board identifier published by [`Responder::enable_arduino`].
    pub fn set_board(&mut self, board: impl Into<String>) {
        self.board = board.into();
    }

    /// Returns the registered services, in registration order.
    #[inline]
    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    /// Registers a service, using the hostname as the instance name.
    ///
    /// Registering the same service type and instance again replaces the
    /// earlier record.
    pub fn add_service(&mut self, ty: ServiceType, port: u16) -> &mut ServiceRecord {
        let instance = self.hostname.clone();
        self.add_service_with(ty, instance, port, TxtData::new())
    }

    /// Registers a service with an explicit instance name and TXT metadata.
    pub fn add_service_with(
        &mut self,
        ty: ServiceType,
        instance: Label,
        port: u16,
        txt: TxtData,
    ) -> &mut ServiceRecord {
        let mut record = ServiceRecord::new(ty, instance, port);
        *record.txt_mut() = txt;

        let existing = self.services.iter().position(|svc| {
            svc.service_type() == record.service_type() && svc.instance() == record.instance()
        });
        let index = match existing {
            Some(i) => {
                self.services[i] = record;
                i
            }
            None => {
                self.services.push(record);
                self.services.len() - 1
            }
        };
        &mut self.services[index]
    }

    /// Registers the well-known `_arduino._tcp` IDE/flashing endpoint.
    ///
    /// `auth` controls the advertised `auth_upload` attribute, telling the
    /// IDE whether uploads require authentication.
    pub fn enable_arduino(&mut self, port: u16, auth: bool) {
        let mut txt = TxtData::new();
        txt.add("tcp_check", "no");
        txt.add("ssh_upload", "no");
        txt.add("board", &self.board);
        txt.add("auth_upload", if auth { "yes" } else { "no" });

        let ty = ServiceType::new("arduino", Transport::Tcp).unwrap();
        let instance = self.hostname.clone();
        self.add_service_with(ty, instance, port, txt);
    }

    /// Creates the multicast UDP socket the responder listens on.
    pub fn create_socket(&self) -> io::Result<UdpSocket> {
        let sock = Socket::new(Domain::IPV4, SockType::DGRAM, Some(Protocol::UDP))?;
        sock.set_reuse_address(true)?;
        sock.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT).into())?;

        let sock = UdpSocket::from(sock);
        sock.join_multicast_v4(&MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)?;

        log::info!("{:?} <-> {}", self.addrs, self.host_domain);

        Ok(sock)
    }

    /// Handles a single incoming packet.
    ///
    /// If `packet` is a query this responder has answers for, the reply is
    /// encoded into `reply_buf` and its size and destination are returned.
    /// Queries for other names, response packets, and packets with unexpected
    /// opcodes produce `Ok(None)`.
    pub fn handle_packet(
        &self,
        src: SocketAddr,
        packet: &[u8],
        reply_buf: &mut [u8],
    ) -> Result<Option<Reply>, wire::Error> {
        let mut dec = MessageDecoder::new(packet)?;
        if !dec.header().is_query() {
            return Ok(None);
        }
        if dec.header().opcode() != Opcode::QUERY {
            return Ok(None);
        }
        if dec.header().rcode() != RCode::NO_ERROR {
            return Ok(None);
        }

        // Queriers not bound to port 5353 are legacy one-shot resolvers:
        // their replies go back unicast, with the query ID and question
        // echoed and without mDNS-specific bits (RFC 6762 §6.7).
        let legacy = src.port() != MDNS_PORT;
        let mut unicast = legacy;

        let mut matched = Vec::new();
        for res in dec.iter() {
            let q = res?;
            let (set, targets) = self.classify(&q);
            log::debug!("Q: {} -> {:?}", q, set);
            if set.is_empty() {
                continue;
            }
            if q.unicast_response() {
                unicast = true;
            }
            matched.push((q, set, targets));
        }

        if matched.is_empty() {
            return Ok(None);
        }

        let mut answers = Vec::new();
        let mut additionals = Vec::new();
        for (_, set, targets) in &matched {
            self.collect_records(*set, targets, &mut answers, &mut additionals);
        }
        // Records already present as answers don't need to be repeated in the
        // additional section.
        additionals.retain(|extra| !answers.contains(extra));

        let mut header = Header::default();
        header.set_response(true);
        header.set_authority(true);
        if legacy {
            header.set_id(dec.header().id());
        }

        let ttl = if legacy {
            LEGACY_TTL.min(self.ttl)
        } else {
            self.ttl
        };

        let mut enc = MessageEncoder::new(reply_buf);
        enc.set_header(header);
        if legacy {
            for (q, _, _) in &matched {
                enc.question(
                    encoder::Question::new(q.qname())
                        .ty(q.qtype())
                        .class(q.qclass()),
                );
            }
        }
        let mut enc = enc.answers();
        for (name, record, flush) in &answers {
            enc.add_answer(
                encoder::ResourceRecord::new(name, record)
                    .ttl(ttl)
                    .cache_flush(*flush && !legacy),
            );
        }
        let mut enc = enc.additional();
        for (name, record, flush) in &additionals {
            enc.add_additional(
                encoder::ResourceRecord::new(name, record)
                    .ttl(ttl)
                    .cache_flush(*flush && !legacy),
            );
        }

        // Truncated replies still get sent, with the TC bit already set.
        let size = enc.finish().ok().unwrap_or(reply_buf.len());

        let dest = if unicast {
            src
        } else {
            SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP, MDNS_PORT))
        };
        Ok(Some(Reply { size, dest }))
    }

    /// Encodes an unsolicited announcement of all advertised records into
    /// `buf`, returning the encoded size.
    ///
    /// Passing `ttl` 0 produces a goodbye packet that flushes the records
    /// from peer caches.
    pub fn announcement(&self, buf: &mut [u8], ttl: u32) -> usize {
        let mut answers = Vec::new();
        self.push_host_records(&mut answers);
        for svc in &self.services {
            push_unique(&mut answers, self.type_enum_record(svc));
            push_unique(&mut answers, self.instance_ptr_record(svc));
            push_unique(&mut answers, self.srv_record(svc));
            push_unique(&mut answers, self.txt_record(svc));
        }

        let mut header = Header::default();
        header.set_response(true);
        header.set_authority(true);

        let mut enc = MessageEncoder::new(buf);
        enc.set_header(header);
        let mut enc = enc.answers();
        for (name, record, flush) in &answers {
            enc.add_answer(
                encoder::ResourceRecord::new(name, record)
                    .ttl(ttl)
                    .cache_flush(*flush),
            );
        }
        enc.finish().ok().unwrap_or(buf.len())
    }

    /// Determines which records answer `q`, and which services they come
    /// from.
    fn classify(&self, q: &Question) -> (ReplySet, Vec<usize>) {
        let mut set = ReplySet::empty();
        let mut targets = Vec::new();

        if !q.qclass().matches(Class::IN) {
            return (set, targets);
        }

        let name = q.qname();

        if *name == self.host_domain {
            if q.qtype().matches(Type::A) && self.addrs.iter().any(|a| a.is_ipv4()) {
                set |= ReplySet::HOST_A;
            }
            if q.qtype().matches(Type::AAAA) && self.addrs.iter().any(|a| a.is_ipv6()) {
                set |= ReplySet::HOST_AAAA;
            }
            return (set, targets);
        }

        if *name == self.enum_domain {
            if q.qtype().matches(Type::PTR) && !self.services.is_empty() {
                set |= ReplySet::TYPE_ENUM_PTR;
            }
            return (set, targets);
        }

        for (i, svc) in self.services.iter().enumerate() {
            if *name == svc.service_domain(&self.parent) {
                // Several instances can share a service type; answer with all
                // of them.
                if q.qtype().matches(Type::PTR) {
                    set |= ReplySet::SERVICE_PTR;
                    targets.push(i);
                }
            } else if *name == svc.instance_domain(&self.parent) {
                if q.qtype().matches(Type::SRV) {
                    set |= ReplySet::INSTANCE_SRV;
                    targets.push(i);
                }
                if q.qtype().matches(Type::TXT) {
                    set |= ReplySet::INSTANCE_TXT;
                    if !targets.contains(&i) {
                        targets.push(i);
                    }
                }
            }
        }

        (set, targets)
    }

    fn collect_records(
        &self,
        set: ReplySet,
        targets: &[usize],
        answers: &mut Vec<RecordEntry>,
        additionals: &mut Vec<RecordEntry>,
    ) {
        if set.contains(ReplySet::HOST_A) || set.contains(ReplySet::HOST_AAAA) {
            let mut host = Vec::new();
            self.push_host_records(&mut host);
            for entry in host {
                let keep = match entry.1 {
                    RecordData::A(_) => set.contains(ReplySet::HOST_A),
                    RecordData::AAAA(_) => set.contains(ReplySet::HOST_AAAA),
                    _ => false,
                };
                if keep {
                    push_unique(answers, entry);
                }
            }
        }

        if set.contains(ReplySet::TYPE_ENUM_PTR) {
            for svc in &self.services {
                push_unique(answers, self.type_enum_record(svc));
            }
        }

        for &i in targets {
            let svc = &self.services[i];
            if set.contains(ReplySet::SERVICE_PTR) {
                // A PTR answer is completed by the SRV, TXT, and address
                // records the browser will ask for next (RFC 6763 §12.1).
                push_unique(answers, self.instance_ptr_record(svc));
                push_unique(additionals, self.srv_record(svc));
                push_unique(additionals, self.txt_record(svc));
                self.push_host_records(additionals);
            }
            if set.contains(ReplySet::INSTANCE_SRV) {
                push_unique(answers, self.srv_record(svc));
                self.push_host_records(additionals);
            }
            if set.contains(ReplySet::INSTANCE_TXT) {
                push_unique(answers, self.txt_record(svc));
            }
        }
    }

    fn push_host_records(&self, list: &mut Vec<RecordEntry>) {
        for addr in &self.addrs {
            let record = match addr {
                IpAddr::V4(addr) => RecordData::A(A::new(*addr)),
                IpAddr::V6(addr) => RecordData::AAAA(AAAA::new(*addr)),
            };
            push_unique(list, (self.host_domain.clone(), record, true));
        }
    }

    fn srv_record(&self, svc: &ServiceRecord) -> RecordEntry {
        (
            svc.instance_domain(&self.parent),
            RecordData::SRV(SRV::new(0, 0, svc.port(), self.host_domain.clone())),
            true,
        )
    }

    fn txt_record(&self, svc: &ServiceRecord) -> RecordEntry {
        (
            svc.instance_domain(&self.parent),
            RecordData::TXT(svc.txt().to_record()),
            true,
        )
    }

    /// `<service>.<transport>.local PTR <instance>.<service>.<transport>.local`
    fn instance_ptr_record(&self, svc: &ServiceRecord) -> RecordEntry {
        (
            svc.service_domain(&self.parent),
            RecordData::PTR(PTR::new(svc.instance_domain(&self.parent))),
            // PTR records are shared between responders and must not carry
            // the cache-flush bit.
            false,
        )
    }

    /// `_services._dns-sd._udp.local PTR <service>.<transport>.local`
    fn type_enum_record(&self, svc: &ServiceRecord) -> RecordEntry {
        (
            self.enum_domain.clone(),
            RecordData::PTR(PTR::new(svc.service_domain(&self.parent))),
            false,
        )
    }
}

/// Blocking mDNS responder: a [`Responder`] plus the multicast socket.
pub struct SyncResponder {
    resp: Responder,
    sock: UdpSocket,
    nonblocking: bool,
}

impl SyncResponder {
    /// Creates a responder advertising `addr` as `hostname.local`, binds the
    /// multicast socket, and announces the hostname on the network.
    pub fn new(hostname: Label, addr: IpAddr) -> io::Result<Self> {
        let resp = Responder::new(hostname, addr);
        let sock = resp.create_socket()?;
        let this = Self {
            resp,
            sock,
            nonblocking: false,
        };
        this.announce()?;
        Ok(this)
    }

    /// Adds another IP address to resolve the hostname to.
    pub fn add_address(&mut self, addr: IpAddr) -> io::Result<()> {
        self.resp.add_address(addr);
        self.announce()
    }

    /// Sets the time-to-live of all advertised records, in seconds.
    pub fn set_ttl(&mut self, ttl: u32) {
        self.resp.set_ttl(ttl);
    }

    /// Sets the board identifier published by
    /// [`SyncResponder::enable_arduino`].
    pub fn set_board(&mut self, board: impl Into<String>) {
        self.resp.set_board(board);
    }

    /// Returns the registered services, in registration order.
    pub fn services(&self) -> &[ServiceRecord] {
        self.resp.services()
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.sock
    }

    /// Registers a service and announces it, using the hostname as the
    /// instance name.
    pub fn add_service(&mut self, ty: ServiceType, port: u16) -> io::Result<()> {
        self.resp.add_service(ty, port);
        self.announce()
    }

    /// Registers a service with an explicit instance name and TXT metadata,
    /// and announces it.
    pub fn add_service_with(
        &mut self,
        ty: ServiceType,
        instance: Label,
        port: u16,
        txt: TxtData,
    ) -> io::Result<()> {
        self.resp.add_service_with(ty, instance, port, txt);
        self.announce()
    }

    /// Registers the well-known `_arduino._tcp` IDE/flashing endpoint and
    /// announces it.
    pub fn enable_arduino(&mut self, port: u16, auth: bool) -> io::Result<()> {
        self.resp.enable_arduino(port, auth);
        self.announce()
    }

    /// Processes all pending incoming packets without blocking.
    ///
    /// This must be called repeatedly from the application's control loop.
    /// It returns once no more datagrams are queued on the socket.
    pub fn update(&mut self) -> io::Result<()> {
        self.set_nonblocking(true)?;

        let mut recv_buf = [0; MDNS_BUFFER_SIZE];
        loop {
            match self.sock.recv_from(&mut recv_buf) {
                Ok((len, addr)) => self.handle(addr, &recv_buf[..len])?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Listens for and replies to queries.
    ///
    /// The advertised records are re-announced every half TTL, so caches
    /// never see them expire. This method will not return, except when an
    /// error occurs.
    pub fn listen(&mut self) -> io::Result<()> {
        self.set_nonblocking(false)?;
        let refresh = Duration::from_secs(u64::from(self.resp.ttl() / 2).max(1));
        self.sock.set_read_timeout(Some(refresh))?;

        let mut recv_buf = [0; MDNS_BUFFER_SIZE];
        loop {
            match self.sock.recv_from(&mut recv_buf) {
                Ok((len, addr)) => self.handle(addr, &recv_buf[..len])?,
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    self.announce()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends an unsolicited announcement of all records to the multicast
    /// group.
    pub fn announce(&self) -> io::Result<()> {
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = self.resp.announcement(&mut buf, self.resp.ttl());
        self.sock.send_to(&buf[..len], (MDNS_GROUP, MDNS_PORT))?;
        Ok(())
    }

    fn handle(&self, src: SocketAddr, packet: &[u8]) -> io::Result<()> {
        log::trace!("raw recv from {}: {}", src, Hex(packet));

        let mut reply_buf = [0; MDNS_BUFFER_SIZE];
        match self.resp.handle_packet(src, packet, &mut reply_buf) {
            Ok(Some(reply)) => {
                self.sock.send_to(&reply_buf[..reply.size()], reply.dest())?;
            }
            Ok(None) => {}
            Err(e) => {
                log::debug!("failed to handle packet: {}", e);
            }
        }
        Ok(())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        if self.nonblocking != nonblocking {
            self.sock.set_nonblocking(nonblocking)?;
            self.nonblocking = nonblocking;
        }
        Ok(())
    }
}

impl Drop for SyncResponder {
    fn drop(&mut self) {
        // Goodbye packet: a zero-TTL announcement flushes our records from
        // peer caches instead of letting them linger until expiry.
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = self.resp.announcement(&mut buf, 0);
        if let Err(e) = self.sock.send_to(&buf[..len], (MDNS_GROUP, MDNS_PORT)) {
            log::debug!("failed to send goodbye packet: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::wire::QType;

    use super::*;

    const HOST_V4: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 9);

    fn responder() -> Responder {
        let mut resp = Responder::new(Label::new("printer"), IpAddr::V4(HOST_V4));
        resp.add_service("_http._tcp".parse().unwrap(), 80);
        resp
    }

    fn mdns_src() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 50), MDNS_PORT))
    }

    fn legacy_src() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 50), 49152))
    }

    fn query(id: u16, name: &str, qtype: QType) -> Vec<u8> {
        let name: DomainName = name.parse().unwrap();
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let mut header = Header::default();
        header.set_id(id);
        let mut enc = MessageEncoder::new(&mut buf);
        enc.set_header(header);
        enc.question(encoder::Question::new(&name).ty(qtype));
        let len = enc.finish().unwrap();
        buf[..len].to_vec()
    }

    fn handle(resp: &Responder, src: SocketAddr, packet: &[u8]) -> Option<(Vec<u8>, SocketAddr)> {
        let mut reply_buf = [0; MDNS_BUFFER_SIZE];
        let reply = resp.handle_packet(src, packet, &mut reply_buf).unwrap()?;
        Some((reply_buf[..reply.size()].to_vec(), reply.dest()))
    }

    #[test]
    fn answers_host_address_query() {
        let resp = responder();
        let query = query(0, "printer.local", QType::A);
        let (reply, dest) = handle(&resp, mdns_src(), &query).unwrap();

        assert_eq!(
            dest,
            SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP, MDNS_PORT)),
        );

        let dec = MessageDecoder::new(&reply).unwrap();
        assert!(dec.header().is_response());
        assert!(dec.header().is_authority());
        assert_eq!(dec.header().id(), 0);
        assert_eq!(dec.header().question_count(), 0);
        assert_eq!(dec.header().answer_count(), 1);

        let mut dec = dec.answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        assert_eq!(rr.name().to_string(), "printer.local.");
        assert!(rr.cache_flush());
        assert_eq!(rr.ttl(), DEFAULT_TTL);
        match rr.as_enum().unwrap().unwrap() {
            RecordData::A(a) => assert_eq!(a.addr(), HOST_V4),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn matches_names_case_insensitively() {
        let resp = responder();
        let query = query(0, "PRINTER.LOCAL", QType::A);
        assert!(handle(&resp, mdns_src(), &query).is_some());
    }

    #[test]
    fn ignores_unknown_names_and_types() {
        let resp = responder();

        let other = query(0, "toaster.local", QType::A);
        assert!(handle(&resp, mdns_src(), &other).is_none());

        // No IPv6 address is registered.
        let aaaa = query(0, "printer.local", QType::AAAA);
        assert!(handle(&resp, mdns_src(), &aaaa).is_none());

        let srv = query(0, "printer.local", QType::SRV);
        assert!(handle(&resp, mdns_src(), &srv).is_none());
    }

    #[test]
    fn ignores_responses() {
        let resp = responder();
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = resp.announcement(&mut buf, DEFAULT_TTL);
        // Feeding our own announcement back in must not produce a reply.
        assert!(handle(&resp, mdns_src(), &buf[..len]).is_none());
    }

    #[test]
    fn rejects_malformed_packets() {
        let resp = responder();
        let mut reply_buf = [0; MDNS_BUFFER_SIZE];
        let res = resp.handle_packet(mdns_src(), &[0x12, 0x34], &mut reply_buf);
        assert_eq!(res.unwrap_err(), wire::Error::Eof);
    }

    #[test]
    fn browse_returns_ptr_with_details() {
        let resp = responder();
        let query = query(0, "_http._tcp.local", QType::PTR);
        let (reply, _) = handle(&resp, mdns_src(), &query).unwrap();

        let dec = MessageDecoder::new(&reply).unwrap();
        assert_eq!(dec.header().answer_count(), 1);
        // SRV + TXT + A travel along in the additional section.
        assert_eq!(dec.header().additional_count(), 3);

        let mut dec = dec.answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        assert_eq!(rr.name().to_string(), "_http._tcp.local.");
        assert!(!rr.cache_flush(), "shared PTR records must not set cache-flush");
        match rr.as_enum().unwrap().unwrap() {
            RecordData::PTR(ptr) => {
                assert_eq!(ptr.ptrdname().to_string(), "printer._http._tcp.local.");
            }
            other => panic!("unexpected record: {:?}", other),
        }

        let mut dec = dec.additional().unwrap();
        let mut types = Vec::new();
        for rr in dec.iter() {
            let rr = rr.unwrap();
            match rr.as_enum().unwrap().unwrap() {
                RecordData::SRV(srv) => {
                    assert_eq!(srv.port(), 80);
                    assert_eq!(srv.target().to_string(), "printer.local.");
                }
                RecordData::TXT(txt) => {
                    assert_eq!(txt.entries().collect::<Vec<_>>(), [&b""[..]]);
                }
                RecordData::A(a) => assert_eq!(a.addr(), HOST_V4),
                other => panic!("unexpected record: {:?}", other),
            }
            types.push(rr.type_());
        }
        assert_eq!(types, [Type::SRV, Type::TXT, Type::A]);
    }

    #[test]
    fn enumerates_service_types() {
        let mut resp = responder();
        resp.add_service("_osc._udp".parse().unwrap(), 9000);

        let query = query(0, "_services._dns-sd._udp.local", QType::PTR);
        let (reply, _) = handle(&resp, mdns_src(), &query).unwrap();

        let mut dec = MessageDecoder::new(&reply).unwrap().answers().unwrap();
        let mut ptrs = Vec::new();
        for rr in dec.iter() {
            let rr = rr.unwrap();
            match rr.as_enum().unwrap().unwrap() {
                RecordData::PTR(ptr) => ptrs.push(ptr.ptrdname().to_string()),
                other => panic!("unexpected record: {:?}", other),
            }
        }
        assert_eq!(ptrs, ["_http._tcp.local.", "_osc._udp.local."]);
    }

    #[test]
    fn resolves_instance_srv_and_txt() {
        let mut resp = Responder::new(Label::new("printer"), IpAddr::V4(HOST_V4));
        let mut txt = TxtData::new();
        txt.add("path", "/queue");
        resp.add_service_with(
            "_ipp._tcp".parse().unwrap(),
            Label::new("Front Desk"),
            631,
            txt,
        );

        let srv_query = query(0, "Front Desk._ipp._tcp.local", QType::SRV);
        let (reply, _) = handle(&resp, mdns_src(), &srv_query).unwrap();
        let dec = MessageDecoder::new(&reply).unwrap();
        assert_eq!(dec.header().answer_count(), 1);
        assert_eq!(dec.header().additional_count(), 1); // host A record
        let mut dec = dec.answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        assert!(rr.cache_flush());
        match rr.as_enum().unwrap().unwrap() {
            RecordData::SRV(srv) => {
                assert_eq!(srv.port(), 631);
                assert_eq!(srv.target().to_string(), "printer.local.");
            }
            other => panic!("unexpected record: {:?}", other),
        }

        let txt_query = query(0, "front desk._ipp._tcp.local", QType::TXT);
        let (reply, _) = handle(&resp, mdns_src(), &txt_query).unwrap();
        let mut dec = MessageDecoder::new(&reply).unwrap().answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        match rr.as_enum().unwrap().unwrap() {
            RecordData::TXT(txt) => {
                assert_eq!(txt.entries().collect::<Vec<_>>(), [&b"path=/queue"[..]]);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn any_query_combines_srv_and_txt() {
        let resp = responder();
        let query = query(0, "printer._http._tcp.local", QType::ANY);
        let (reply, _) = handle(&resp, mdns_src(), &query).unwrap();
        let dec = MessageDecoder::new(&reply).unwrap();
        assert_eq!(dec.header().answer_count(), 2);
    }

    #[test]
    fn duplicate_questions_answered_once() {
        let resp = responder();
        let name: DomainName = "printer.local".parse().unwrap();
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let mut enc = MessageEncoder::new(&mut buf);
        enc.question(encoder::Question::new(&name).ty(QType::A));
        enc.question(encoder::Question::new(&name).ty(QType::ANY));
        let len = enc.finish().unwrap();

        let (reply, _) = handle(&resp, mdns_src(), &buf[..len]).unwrap();
        let dec = MessageDecoder::new(&reply).unwrap();
        assert_eq!(dec.header().answer_count(), 1);
    }

    #[test]
    fn legacy_queries_get_unicast_replies() {
        let resp = responder();
        let query = query(0x1234, "printer.local", QType::A);
        let (reply, dest) = handle(&resp, legacy_src(), &query).unwrap();

        assert_eq!(dest, legacy_src());

        let dec = MessageDecoder::new(&reply).unwrap();
        assert_eq!(dec.header().id(), 0x1234);
        // The question is echoed for legacy resolvers.
        assert_eq!(dec.header().question_count(), 1);

        let mut dec = dec.answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        assert!(!rr.cache_flush(), "legacy replies must not set mDNS bits");
        assert!(rr.ttl() <= LEGACY_TTL);
    }

    #[test]
    fn qu_bit_requests_unicast_reply() {
        let resp = responder();
        let name: DomainName = "printer.local".parse().unwrap();
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let mut enc = MessageEncoder::new(&mut buf);
        enc.question(
            encoder::Question::new(&name)
                .ty(QType::A)
                .unicast_response(true),
        );
        let len = enc.finish().unwrap();

        let (reply, dest) = handle(&resp, mdns_src(), &buf[..len]).unwrap();
        assert_eq!(dest, mdns_src());

        // Still a proper mDNS reply: ID 0, no questions echoed.
        let dec = MessageDecoder::new(&reply).unwrap();
        assert_eq!(dec.header().id(), 0);
        assert_eq!(dec.header().question_count(), 0);
    }

    #[test]
    fn arduino_service_metadata() {
        let mut resp = Responder::new(Label::new("esp"), IpAddr::V4(HOST_V4));
        resp.enable_arduino(8266, false);

        let query = query(0, "esp._arduino._tcp.local", QType::TXT);
        let (reply, _) = handle(&resp, mdns_src(), &query).unwrap();
        let mut dec = MessageDecoder::new(&reply).unwrap().answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        match rr.as_enum().unwrap().unwrap() {
            RecordData::TXT(txt) => {
                let entries = txt.entries().collect::<Vec<_>>();
                assert!(entries.contains(&&b"auth_upload=no"[..]));
                assert!(entries.contains(&&b"board=generic"[..]));
                assert!(entries.contains(&&b"tcp_check=no"[..]));
                assert!(entries.contains(&&b"ssh_upload=no"[..]));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn reregistering_service_replaces_record() {
        let mut resp = responder();
        resp.add_service("_http._tcp".parse().unwrap(), 8080);
        assert_eq!(resp.services().len(), 1);
        assert_eq!(resp.services()[0].port(), 8080);
    }

    #[test]
    fn announcement_covers_all_records() {
        let resp = responder();
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = resp.announcement(&mut buf, DEFAULT_TTL);

        let dec = MessageDecoder::new(&buf[..len]).unwrap();
        assert!(dec.header().is_response());
        // A + type enumeration PTR + instance PTR + SRV + TXT
        assert_eq!(dec.header().answer_count(), 5);

        let mut dec = dec.answers().unwrap();
        for rr in dec.iter() {
            assert_eq!(rr.unwrap().ttl(), DEFAULT_TTL);
        }
    }

    #[test]
    fn goodbye_has_zero_ttl() {
        let resp = responder();
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = resp.announcement(&mut buf, 0);

        let mut dec = MessageDecoder::new(&buf[..len]).unwrap().answers().unwrap();
        let mut seen = 0;
        for rr in dec.iter() {
            assert_eq!(rr.unwrap().ttl(), 0);
            seen += 1;
        }
        assert_eq!(seen, 5);
    }
}
