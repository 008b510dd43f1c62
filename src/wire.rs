//! mDNS message decoder and encoder.
//!
//! This is a classic DNS wire codec (RFC 1035), restricted to the record
//! types a multicast DNS responder has to produce and understand, plus the
//! mDNS-specific bits from RFC 6762: the cache-flush bit on resource record
//! classes and the unicast-response bit on question classes.

#[macro_use]
mod macros;

pub mod decoder;
pub mod encoder;
mod error;
pub mod name;
mod num;
pub mod rdata;
pub mod section;

use core::fmt;

use bitflags::bitflags;

use self::num::U16;

pub use self::error::Error;

wire_enum! {
    /// DNS message operation codes.
    pub enum Opcode: u8 {
        /// Query (or response to a query).
        ///
        /// The only opcode a multicast DNS responder answers; messages with
        /// any other opcode are ignored.
        QUERY = 0,

        /// Inverse Query. Obsolete, never answered.
        IQUERY = 1,

        /// Server status request.
        STATUS = 2,
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

wire_enum! {
    /// Server response codes.
    pub enum RCode: u8 {
        /// No error.
        NO_ERROR = 0,
        /// The query sent by the client was erroneous.
        FORM_ERR = 1,
        /// A server-side error prevented processing of the query.
        SERV_FAIL = 2,
        /// Signifies that the queried domain name does not exist.
        NX_DOMAIN = 3,
        /// The requested query type is not supported by the server.
        NOT_IMP = 4,
        /// The server refused to answer the query for policy reasons.
        REFUSED = 5,
    }
}

impl fmt::Display for RCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

wire_enum! {
    /// Resource Record types.
    ///
    /// Restricted to the types relevant to mDNS responders; unknown values
    /// are preserved and printed numerically.
    pub enum Type: u16 {
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

wire_enum! {
    /// The queried resource type that a client is interested in.
    pub enum QType: u16 {
        // Prefix is identical to `Type`.
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        TXT = 16,
        AAAA = 28,
        SRV = 33,

        /// Query is for all record types.
        ANY = 255,
    }
}

impl QType {
    pub fn matches(&self, ty: Type) -> bool {
        match *self {
            Self::ANY => true,
            _ => self.0 == ty.0,
        }
    }
}

impl fmt::Display for QType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

wire_enum! {
    /// Resource Record classes.
    pub enum Class: u16 {
        /// The Internet. The only class multicast DNS uses.
        IN = 1,
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

wire_enum! {
    /// The queried resource class.
    pub enum QClass: u16 {
        /// The Internet.
        IN = 1,

        /// Query is for all classes of resource.
        ANY = 255,
    }
}

impl QClass {
    pub fn matches(&self, class: Class) -> bool {
        if *self == Self::ANY {
            true
        } else {
            self.0 == class.0
        }
    }
}

impl fmt::Display for QClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Top bit of the resource record class: mDNS cache-flush (RFC 6762 §10.2).
/// In questions, the same bit requests a unicast response (RFC 6762 §5.4).
pub(crate) const CLASS_TOP_BIT: u16 = 0x8000;

// Bit positions in the header flags are inverted, because RFC 1035 starts counting at the MSb.
const fn be_pos(pos: u16) -> u16 {
    15 - pos
}

bitflags! {
    #[derive(Debug)]
    #[repr(transparent)]
    struct HeaderFlags: u16 {
        /// If set, the message is a response to a query. If unset, it is a query.
        const QR = 1 << be_pos(0);
        const OPCODE = Self::OPCODE_MASK;
        /// Set if this response was sent from a name server that is the
        /// authority for the queried domain name. mDNS responses always set
        /// this bit.
        const AA = 1 << be_pos(5);
        /// Set if the message was truncated because it is longer than the
        /// maximum allowed length of the transmission channel.
        const TC = 1 << be_pos(6);
        const RCODE = Self::RCODE_MASK;
    }
}

impl HeaderFlags {
    const OPCODE_POS: u16 = 11;
    const OPCODE_MASK: u16 = 0b1111 << Self::OPCODE_POS;

    const RCODE_POS: u16 = 0;
    const RCODE_MASK: u16 = 0b1111 << Self::RCODE_POS;

    fn opcode(&self) -> Opcode {
        Opcode(((self.bits() & Self::OPCODE_MASK) >> Self::OPCODE_POS) as u8)
    }

    fn rcode(&self) -> RCode {
        RCode(((self.bits() & Self::RCODE_MASK) >> Self::RCODE_POS) as u8)
    }
}

/// Message header.
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct Header {
    id: U16,
    flags: U16,
    qdcount: U16,
    ancount: U16,
    nscount: U16,
    arcount: U16,
}

impl Header {
    fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags.get())
    }

    fn modify_flags(&mut self, with: impl FnOnce(&mut HeaderFlags)) {
        let mut flags = self.flags();
        with(&mut flags);
        self.flags = flags.bits().into();
    }

    /// Returns the 16-bit message ID.
    ///
    /// Multicast responses use ID 0; responses to legacy unicast queries copy
    /// the ID of the query.
    #[inline]
    pub fn id(&self) -> u16 {
        self.id.get()
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.id = id.into();
    }

    #[inline]
    pub fn is_query(&self) -> bool {
        !self.is_response()
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags().contains(HeaderFlags::QR)
    }

    pub fn set_response(&mut self, is_response: bool) {
        self.modify_flags(|f| f.set(HeaderFlags::QR, is_response));
    }

    /// Returns whether the truncation flag is set, indicating that the
    /// message was truncated to fit in the transport channel.
    pub fn is_truncated(&self) -> bool {
        self.flags().contains(HeaderFlags::TC)
    }

    pub fn set_truncated(&mut self, trunc: bool) {
        self.modify_flags(|f| f.set(HeaderFlags::TC, trunc));
    }

    pub fn is_authority(&self) -> bool {
        self.flags().contains(HeaderFlags::AA)
    }

    pub fn set_authority(&mut self, aa: bool) {
        self.modify_flags(|f| f.set(HeaderFlags::AA, aa));
    }

    pub fn opcode(&self) -> Opcode {
        self.flags().opcode()
    }

    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.modify_flags(|f| {
            f.remove(HeaderFlags::OPCODE);
            *f.0.bits_mut() |=
                (u16::from(opcode.0) << HeaderFlags::OPCODE_POS) & HeaderFlags::OPCODE_MASK;
        });
    }

    pub fn rcode(&self) -> RCode {
        self.flags().rcode()
    }

    pub fn set_rcode(&mut self, rcode: RCode) {
        self.modify_flags(|f| {
            f.remove(HeaderFlags::RCODE);
            *f.0.bits_mut() |=
                (u16::from(rcode.0) << HeaderFlags::RCODE_POS) & HeaderFlags::RCODE_MASK;
        });
    }

    pub fn question_count(&self) -> u16 {
        self.qdcount.get()
    }

    pub fn answer_count(&self) -> u16 {
        self.ancount.get()
    }

    pub fn authoritative_count(&self) -> u16 {
        self.nscount.get()
    }

    pub fn additional_count(&self) -> u16 {
        self.arcount.get()
    }

    fn set_qdcount(&mut self, qdcount: u16) {
        self.qdcount = qdcount.into();
    }

    fn set_ancount(&mut self, ancount: u16) {
        self.ancount = ancount.into();
    }

    fn set_nscount(&mut self, nscount: u16) {
        self.nscount = nscount.into();
    }

    fn set_arcount(&mut self, arcount: u16) {
        self.arcount = arcount.into();
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("id", &self.id())
            .field("flags", &self.flags())
            .field("qdcount", &self.qdcount.get())
            .field("ancount", &self.ancount.get())
            .field("nscount", &self.nscount.get())
            .field("arcount", &self.arcount.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header() {
        let mut h = Header::default();
        assert!(h.is_query());
        assert!(!h.is_authority());
        assert!(!h.is_response());

        h.set_response(true);
        h.set_authority(true);
        assert!(h.is_response());
        assert!(h.is_authority());

        assert_eq!(h.opcode(), Opcode::QUERY);
        h.set_opcode(Opcode::STATUS);
        assert_eq!(h.opcode(), Opcode::STATUS);
        h.set_opcode(Opcode::QUERY);
        assert_eq!(h.opcode(), Opcode::QUERY);

        assert_eq!(h.rcode(), RCode::NO_ERROR);
        h.set_rcode(RCode::REFUSED);
        assert_eq!(h.rcode(), RCode::REFUSED);
        h.set_rcode(RCode::NO_ERROR);
        assert_eq!(h.rcode(), RCode::NO_ERROR);
    }

    #[test]
    fn qtype_matching() {
        assert!(QType::ANY.matches(Type::A));
        assert!(QType::ANY.matches(Type::SRV));
        assert!(QType::PTR.matches(Type::PTR));
        assert!(!QType::PTR.matches(Type::SRV));
    }
}
