//! DNS message encoder.
//!
//! The encoder writes into a caller-provided buffer and performs name
//! compression: every domain name written to the message is remembered, and
//! later names that end in an already-written suffix are encoded as a
//! backwards pointer to it (RFC 1035 §4.1.4).

use core::marker::PhantomData;
use std::mem::{align_of, size_of};

use bytemuck::Zeroable;

use super::{
    name::{DomainName, Label},
    rdata::{RdataEncoder, RecordData},
    section::{self, Section},
    Class, Error, Header, QClass, QType, CLASS_TOP_BIT,
};

/// Largest message offset a compression pointer can refer to.
const MAX_POINTER_TARGET: usize = 0b0011_1111_1111_1111;

/// A suffix of an already-written domain name, usable as a compression
/// target.
struct NameOffset {
    offset: u16,
    tail: Vec<Label>,
}

pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pub(crate) pos: usize,
    trunc: bool,
    named: Vec<NameOffset>,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            trunc: false,
            named: Vec::new(),
        }
    }

    fn modify_header(&mut self, with: impl FnOnce(&mut Header)) {
        assert_eq!(align_of::<Header>(), 1);

        let h = bytemuck::from_bytes_mut(&mut self.buf[..size_of::<Header>()]);
        with(h);
    }

    pub(crate) fn write_slice(&mut self, data: &[u8]) {
        let buf = &mut self.buf[self.pos..];
        if data.len() > buf.len() {
            self.trunc = true;
            buf.copy_from_slice(&data[..buf.len()]);
            self.pos += buf.len();
        } else {
            buf[..data.len()].copy_from_slice(data);
            self.pos += data.len();
        }
    }

    pub(crate) fn write_u8(&mut self, b: u8) {
        self.write_slice(&[b]);
    }

    pub(crate) fn write_u16(&mut self, v: u16) {
        self.write_slice(&v.to_be_bytes());
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_slice(&v.to_be_bytes());
    }

    pub(crate) fn write_domain_name(&mut self, name: &DomainName) {
        let labels = name.labels();

        // Find the longest already-written suffix of `name`. Label equality
        // folds ASCII case, which is fine, since mDNS names are compared
        // case-insensitively anyway.
        let mut pointer = None;
        for split in 0..labels.len() {
            if let Some(entry) = self
                .named
                .iter()
                .find(|e| e.tail.as_slice() == &labels[split..])
            {
                pointer = Some((split, entry.offset));
                break;
            }
        }

        let literal = match pointer {
            Some((split, _)) => split,
            None => labels.len(),
        };

        let mut new_targets = Vec::new();
        for (i, label) in labels[..literal].iter().enumerate() {
            if self.pos <= MAX_POINTER_TARGET {
                new_targets.push(NameOffset {
                    offset: self.pos as u16,
                    tail: labels[i..].to_vec(),
                });
            }
            self.write_u8(label.as_bytes().len() as u8);
            self.write_slice(label.as_bytes());
        }

        match pointer {
            Some((_, offset)) => self.write_u16(0b1100_0000_0000_0000 | offset),
            // Implicit root label at the end.
            None => self.write_u8(0),
        }

        // Truncated names must not become compression targets, since their
        // bytes are incomplete.
        if !self.trunc {
            self.named.extend(new_targets);
        }
    }

    pub(crate) fn write_character_string(&mut self, string: &[u8]) {
        assert!(string.len() <= 255);
        self.write_u8(string.len() as u8);
        self.write_slice(string);
    }
}

struct EncoderInner<'a> {
    w: Writer<'a>,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
}

impl<'a> Drop for EncoderInner<'a> {
    fn drop(&mut self) {
        let trunc = self.w.trunc;
        self.w.modify_header(|h| {
            h.set_qdcount(self.qdcount);
            h.set_ancount(self.ancount);
            h.set_nscount(self.nscount);
            h.set_arcount(self.arcount);
            h.set_truncated(trunc);
        });
    }
}

/// Streaming encoder for DNS messages.
///
/// Like [`MessageDecoder`], the encoder tracks the section it is writing as
/// the `S` type parameter, starting in the [`section::Question`] state.
///
/// [`MessageDecoder`]: super::decoder::MessageDecoder
pub struct MessageEncoder<'a, S: Section> {
    inner: EncoderInner<'a>,
    _p: PhantomData<S>,
}

impl<'a, S: Section> MessageEncoder<'a, S> {
    /// Overrides the whole message header.
    ///
    /// Note that the [`MessageEncoder`] will modify some header fields on
    /// drop, to ensure that the message can be parsed correctly.
    pub fn set_header(&mut self, header: Header) {
        self.inner.w.modify_header(|h| *h = header);
    }

    /// Finishes encoding the message, and returns the number of bytes that
    /// were written to the buffer.
    ///
    /// If the message was truncated because the provided buffer was too
    /// small, this will return [`Error::Truncated`], and the message's
    /// truncation bit will be set. In that case, the user can still decide to
    /// send the message.
    pub fn finish(self) -> Result<usize, Error> {
        let bytes_written = self.inner.w.pos;

        if self.inner.w.trunc {
            Err(Error::Truncated)
        } else {
            Ok(bytes_written)
        }
    }

    fn write_rr(&mut self, rr: ResourceRecord<'_>) {
        let w = &mut self.inner.w;
        w.write_domain_name(rr.name);
        w.write_u16(rr.rdata.record_type().0);
        let mut class = rr.class.0;
        if rr.cache_flush {
            class |= CLASS_TOP_BIT;
        }
        w.write_u16(class);
        w.write_u32(rr.ttl);
        let lenpos = w.pos;
        w.write_u16(0); // patched once the RDATA length is known
        let rdata_start = w.pos;
        rr.rdata.encode(&mut RdataEncoder { w: &mut *w });
        let rdata_len = w.pos - rdata_start;
        let end = w.pos;
        w.pos = lenpos;
        w.write_u16(rdata_len.try_into().expect("RDATA length overflows u16"));
        w.pos = end;
    }
}

impl<'a> MessageEncoder<'a, section::Question> {
    /// Creates a new message encoder that will write to `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        let mut w = Writer::new(buf);
        w.write_slice(bytemuck::bytes_of(&Header::zeroed()));
        Self {
            inner: EncoderInner {
                w,
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            _p: PhantomData,
        }
    }

    /// Adds a question to the *Question* section.
    pub fn question(&mut self, question: Question<'_>) {
        let mut class = question.class.0;
        if question.unicast_response {
            class |= CLASS_TOP_BIT;
        }
        self.inner.w.write_domain_name(question.name);
        self.inner.w.write_u16(question.ty.0);
        self.inner.w.write_u16(class);
        self.inner.qdcount += 1;
    }

    /// Moves the encoder to the *Answer* section.
    #[inline]
    pub fn answers(self) -> MessageEncoder<'a, section::Answer> {
        MessageEncoder {
            inner: self.inner,
            _p: PhantomData,
        }
    }
}

impl<'a> MessageEncoder<'a, section::Answer> {
    pub fn add_answer(&mut self, rr: ResourceRecord<'_>) {
        self.write_rr(rr);
        self.inner.ancount += 1;
    }

    /// Moves the encoder to the *Authority* section.
    #[inline]
    pub fn authority(self) -> MessageEncoder<'a, section::Authority> {
        MessageEncoder {
            inner: self.inner,
            _p: PhantomData,
        }
    }

    /// Moves the encoder to the *Additional Records* section.
    #[inline]
    pub fn additional(self) -> MessageEncoder<'a, section::Additional> {
        self.authority().additional()
    }
}

impl<'a> MessageEncoder<'a, section::Authority> {
    pub fn add_authority(&mut self, rr: ResourceRecord<'_>) {
        self.write_rr(rr);
        self.inner.nscount += 1;
    }

    /// Moves the encoder to the *Additional Records* section.
    #[inline]
    pub fn additional(self) -> MessageEncoder<'a, section::Additional> {
        MessageEncoder {
            inner: self.inner,
            _p: PhantomData,
        }
    }
}

impl<'a> MessageEncoder<'a, section::Additional> {
    pub fn add_additional(&mut self, rr: ResourceRecord<'_>) {
        self.write_rr(rr);
        self.inner.arcount += 1;
    }
}

/// A question to be written to the *Question* section.
pub struct Question<'a> {
    name: &'a DomainName,
    class: QClass,
    ty: QType,
    unicast_response: bool,
}

impl<'a> Question<'a> {
    /// Creates a question asking for all records ([`QType::ANY`]) in the
    /// internet class ([`QClass::IN`]) pertaining to `name`.
    #[inline]
    pub fn new(name: &'a DomainName) -> Self {
        Self {
            name,
            class: QClass::IN,
            ty: QType::ANY,
            unicast_response: false,
        }
    }

    /// Sets the record class to query.
    #[inline]
    pub fn class(self, class: QClass) -> Self {
        Self { class, ..self }
    }

    /// Sets the resource type to query.
    #[inline]
    pub fn ty(self, ty: QType) -> Self {
        Self { ty, ..self }
    }

    /// Sets the mDNS QU bit, asking the responder to reply unicast
    /// (RFC 6762 §5.4).
    #[inline]
    pub fn unicast_response(self, unicast_response: bool) -> Self {
        Self {
            unicast_response,
            ..self
        }
    }
}

/// A resource record to be written to the *Answer*, *Authority*, or
/// *Additional Records* section.
pub struct ResourceRecord<'a> {
    name: &'a DomainName,
    class: Class,
    ttl: u32,
    cache_flush: bool,
    rdata: &'a RecordData<'a>,
}

impl<'a> ResourceRecord<'a> {
    pub fn new(name: &'a DomainName, rdata: &'a RecordData<'a>) -> Self {
        Self {
            name,
            class: Class::IN,
            ttl: 0,
            cache_flush: false,
            rdata,
        }
    }

    #[inline]
    pub fn class(self, class: Class) -> Self {
        Self { class, ..self }
    }

    #[inline]
    pub fn ttl(self, ttl: u32) -> Self {
        Self { ttl, ..self }
    }

    /// Sets the mDNS cache-flush bit on the record's class.
    #[inline]
    pub fn cache_flush(self, cache_flush: bool) -> Self {
        Self { cache_flush, ..self }
    }
}
