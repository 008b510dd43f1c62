//! Typed resource record data.
//!
//! This module contains the record types a multicast DNS responder works
//! with, and their RDATA encodings. Also refer to [`encoder::ResourceRecord`]
//! and [`decoder::ResourceRecord`].
//!
//! [`encoder::ResourceRecord`]: super::encoder::ResourceRecord
//! [`decoder::ResourceRecord`]: super::decoder::ResourceRecord

use std::{
    borrow::Cow,
    fmt::{self, Write},
    marker::PhantomData,
    net::{Ipv4Addr, Ipv6Addr},
};

use super::{
    decoder::{self, Reader},
    encoder::Writer,
    name::DomainName,
    Error, Type,
};

pub struct RdataEncoder<'w, 'a> {
    pub(crate) w: &'w mut Writer<'a>,
}

pub struct RdataDecoder<'a> {
    pub(crate) r: Reader<'a>,
}

/// Trait implemented by all resource record types.
pub trait Rdata<'a>: Sized {
    /// The associated resource record type.
    const TYPE: Type;

    /// Writes the data of this resource record to the given encoder.
    fn encode(&self, enc: &mut RdataEncoder<'_, '_>);

    /// Attempts to decode an instance of this resource record from an RDATA
    /// field.
    fn decode(dec: &mut RdataDecoder<'a>) -> Result<Self, Error>;
}

macro_rules! records {
    (
        $($record:ident),+ $(,)?
    ) => {
        /// Enumeration of all supported resource record types.
        #[non_exhaustive]
        #[derive(Debug, PartialEq, Eq, Clone)]
        pub enum RecordData<'a> {
            $( $record($record<'a>), )+
        }

        impl<'a> RecordData<'a> {
            pub(crate) fn from_rr(rr: &decoder::ResourceRecord<'a>) -> Option<Result<Self, Error>> {
                let dec = &mut RdataDecoder {
                    r: rr.rdata.clone(),
                };
                Some(match rr.type_() {
                    $( Type::$record => $record::decode(dec).map(Self::$record), )+
                    _ => return None,
                })
            }

            pub(crate) fn encode(&self, enc: &mut RdataEncoder<'_, '_>) {
                match self {
                    $( RecordData::$record(rr) => rr.encode(enc), )+
                }
            }

            pub fn record_type(&self) -> Type {
                match self {
                    $( RecordData::$record(_) => Type::$record, )+
                }
            }
        }

        impl<'a> fmt::Display for RecordData<'a> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( RecordData::$record(r) => r.fmt(f), )+
                }
            }
        }
    };
}

records!(A, AAAA, PTR, SRV, TXT);

/// An IPv4 host address.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct A<'a> {
    addr: Ipv4Addr,
    _p: PhantomData<&'a [u8]>,
}

impl<'a> Rdata<'a> for A<'a> {
    const TYPE: Type = Type::A;

    fn encode(&self, enc: &mut RdataEncoder<'_, '_>) {
        enc.w.write_slice(&self.addr.octets())
    }

    fn decode(dec: &mut RdataDecoder<'a>) -> Result<Self, Error> {
        Ok(Self {
            addr: Ipv4Addr::from(*dec.r.read_array()?),
            _p: PhantomData,
        })
    }
}

impl<'a> A<'a> {
    #[inline]
    pub fn new(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            _p: PhantomData,
        }
    }

    #[inline]
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }
}

impl<'a> fmt::Display for A<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

/// An IPv6 host address.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AAAA<'a> {
    addr: Ipv6Addr,
    _p: PhantomData<&'a [u8]>,
}

impl<'a> Rdata<'a> for AAAA<'a> {
    const TYPE: Type = Type::AAAA;

    fn encode(&self, enc: &mut RdataEncoder<'_, '_>) {
        enc.w.write_slice(&self.addr.octets());
    }

    fn decode(dec: &mut RdataDecoder<'a>) -> Result<Self, Error> {
        Ok(Self {
            addr: Ipv6Addr::from(*dec.r.read_array()?),
            _p: PhantomData,
        })
    }
}

impl<'a> AAAA<'a> {
    #[inline]
    pub fn new(addr: Ipv6Addr) -> Self {
        Self {
            addr,
            _p: PhantomData,
        }
    }

    #[inline]
    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }
}

impl<'a> fmt::Display for AAAA<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

/// A name pointer, used by DNS-SD to map service types to instance names.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PTR<'a> {
    ptrdname: DomainName,
    _p: PhantomData<&'a ()>,
}

impl<'a> Rdata<'a> for PTR<'a> {
    const TYPE: Type = Type::PTR;

    fn encode(&self, enc: &mut RdataEncoder<'_, '_>) {
        enc.w.write_domain_name(&self.ptrdname);
    }

    fn decode(dec: &mut RdataDecoder<'a>) -> Result<Self, Error> {
        Ok(Self {
            ptrdname: dec.r.read_domain_name()?,
            _p: PhantomData,
        })
    }
}

impl<'a> PTR<'a> {
    pub fn new(ptrdname: DomainName) -> Self {
        Self {
            ptrdname,
            _p: PhantomData,
        }
    }

    pub fn ptrdname(&self) -> &DomainName {
        &self.ptrdname
    }
}

impl<'a> fmt::Display for PTR<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.ptrdname.fmt(f)
    }
}

/// Location of a service instance: target host and port.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SRV<'a> {
    priority: u16,
    weight: u16,
    port: u16,
    target: DomainName,
    _p: PhantomData<&'a ()>,
}

impl<'a> Rdata<'a> for SRV<'a> {
    const TYPE: Type = Type::SRV;

    fn encode(&self, enc: &mut RdataEncoder<'_, '_>) {
        enc.w.write_u16(self.priority);
        enc.w.write_u16(self.weight);
        enc.w.write_u16(self.port);
        enc.w.write_domain_name(&self.target);
    }

    fn decode(dec: &mut RdataDecoder<'a>) -> Result<Self, Error> {
        Ok(Self {
            priority: dec.r.read_u16()?,
            weight: dec.r.read_u16()?,
            port: dec.r.read_u16()?,
            target: dec.r.read_domain_name()?,
            _p: PhantomData,
        })
    }
}

impl<'a> SRV<'a> {
    pub fn new(priority: u16, weight: u16, port: u16, target: DomainName) -> Self {
        Self {
            priority,
            weight,
            port,
            target,
            _p: PhantomData,
        }
    }

    /// Returns the priority value of this service (lower values mean that the
    /// service should be preferred).
    #[inline]
    pub fn priority(&self) -> u16 {
        self.priority
    }

    #[inline]
    pub fn weight(&self) -> u16 {
        self.weight
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn target(&self) -> &DomainName {
        &self.target
    }
}

impl<'a> fmt::Display for SRV<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.priority, self.weight, self.port, self.target,
        )
    }
}

/// Free-form `key=value` metadata attached to a service instance.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TXT<'a> {
    entries: Vec<Cow<'a, [u8]>>,
}

impl<'a> Rdata<'a> for TXT<'a> {
    const TYPE: Type = Type::TXT;

    fn encode(&self, enc: &mut RdataEncoder<'_, '_>) {
        for entry in self.entries() {
            enc.w.write_character_string(entry);
        }
    }

    fn decode(dec: &mut RdataDecoder<'a>) -> Result<Self, Error> {
        let mut entries = Vec::new();

        // Technically at least one is required, but we accept 0 too.
        while !dec.r.buf().is_empty() {
            entries.push(dec.r.read_character_string()?.into());
        }

        Ok(Self { entries })
    }
}

impl<'a> TXT<'a> {
    /// Creates a new [`TXT`] resource record containing one or more
    /// `entries`.
    ///
    /// # Panics
    ///
    /// This method will panic if `entries` is empty.
    pub fn new<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Cow<'a, [u8]>>,
    {
        let this = Self {
            entries: entries.into_iter().map(|t| t.into()).collect(),
        };
        assert!(!this.entries.is_empty());
        this
    }

    /// Returns an iterator over all *character string* values in this record.
    ///
    /// Each *character string* is an arbitrary sequence of bytes (empty
    /// sequences are allowed). Their interpretation is up to higher-level
    /// specifications.
    pub fn entries(&self) -> impl Iterator<Item = &'_ [u8]> {
        self.entries.iter().map(|cow| &**cow)
    }
}

impl<'a> fmt::Display for TXT<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries().enumerate() {
            if i != 0 {
                f.write_char('\t')?;
            }

            for &byte in entry {
                if byte.is_ascii_graphic() {
                    f.write_char(byte as char)?;
                } else {
                    f.write_char('�')?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_srv() {
        #[rustfmt::skip]
        let rdata = [
            0x00, 0x00, // priority
            0x00, 0x05, // weight
            0x1f, 0x90, // port 8080
            4, b'h', b'o', b's', b't', 5, b'l', b'o', b'c', b'a', b'l', 0,
        ];
        let mut dec = RdataDecoder {
            r: Reader::new(&rdata),
        };
        let srv = SRV::decode(&mut dec).unwrap();
        assert_eq!(srv.priority(), 0);
        assert_eq!(srv.weight(), 5);
        assert_eq!(srv.port(), 8080);
        assert_eq!(srv.target().to_string(), "host.local.");
    }

    #[test]
    fn decode_txt() {
        let rdata = [4, b'a', b'=', b'b', b'c', 0, 6, b'f', b'l', b'a', b'g', b'g', b'y'];
        let mut dec = RdataDecoder {
            r: Reader::new(&rdata),
        };
        let txt = TXT::decode(&mut dec).unwrap();
        let entries = txt.entries().collect::<Vec<_>>();
        assert_eq!(entries, [&b"a=bc"[..], &b""[..], &b"flaggy"[..]]);
    }

    #[test]
    fn decode_txt_eof() {
        // Length byte runs past the end of the RDATA.
        let rdata = [9, b'a'];
        let mut dec = RdataDecoder {
            r: Reader::new(&rdata),
        };
        assert_eq!(TXT::decode(&mut dec), Err(Error::Eof));
    }

    #[test]
    fn display() {
        assert_eq!(A::new(Ipv4Addr::new(192, 168, 1, 9)).to_string(), "192.168.1.9");
        assert_eq!(
            PTR::new("web._http._tcp.local".parse().unwrap()).to_string(),
            "web._http._tcp.local.",
        );
        assert_eq!(TXT::new([&b"a=b"[..], &b"\xff"[..]]).to_string(), "a=b\t�");
    }

    #[test]
    fn record_data_is_covariant() {
        fn _check<'short, 'long: 'short>(rec: RecordData<'long>) -> RecordData<'short> {
            rec
        }
    }
}
