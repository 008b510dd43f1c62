//! Advertised services and their metadata.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
    str::FromStr,
};

use crate::wire::{
    name::{DomainName, Label},
    rdata::TXT,
    Error,
};

/// Transport protocol used by an advertised service (`_tcp` or `_udp`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Service uses TCP.
    Tcp,
    /// Anything but TCP (UDP, SCTP, etc.).
    Udp,
}

impl Transport {
    fn as_str(&self) -> &str {
        match self {
            Transport::Tcp => "_tcp",
            Transport::Udp => "_udp",
        }
    }

    pub fn to_label(&self) -> Label {
        Label::new(self.as_str())
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" | "_tcp" => Ok(Transport::Tcp),
            "udp" | "_udp" => Ok(Transport::Udp),
            _ => Err(Error::InvalidServiceType),
        }
    }
}

/// A service type identifier such as `_http._tcp`.
///
/// A service type is identified by a unique name ([`Label`] starting with an
/// underscore), and the [`Transport`] the service can be reached with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceType {
    /// The service name, starting with an underscore.
    name: Label,
    transport: Transport,
}

impl ServiceType {
    /// Creates a new service type.
    ///
    /// A missing leading underscore in `name` is supplied automatically, so
    /// `"http"` and `"_http"` denote the same service type.
    pub fn new(name: &str, transport: Transport) -> Result<Self, Error> {
        let name = if name.starts_with('_') {
            Label::try_new(name)?
        } else {
            Label::try_new(format!("_{name}"))?
        };
        Ok(Self { name, transport })
    }

    #[inline]
    pub fn name(&self) -> &Label {
        &self.name
    }

    #[inline]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Returns the DNS-SD browsing domain of this service type below
    /// `parent`, e.g. `_http._tcp.local`.
    pub(crate) fn domain(&self, parent: &DomainName) -> DomainName {
        let mut domain = DomainName::from_iter([&self.name, &self.transport.to_label()]);
        domain.extend(parent);
        domain
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.transport)
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, transport) = s.split_once('.').ok_or(Error::InvalidServiceType)?;
        Self::new(name, transport.parse()?)
    }
}

/// A registered service: type, instance name, port, and TXT metadata.
#[derive(Clone, Debug)]
pub struct ServiceRecord {
    ty: ServiceType,
    instance: Label,
    port: u16,
    txt: TxtData,
}

impl ServiceRecord {
    pub fn new(ty: ServiceType, instance: Label, port: u16) -> Self {
        Self {
            ty,
            instance,
            port,
            txt: TxtData::new(),
        }
    }

    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.ty
    }

    /// The instance name, typically the hostname of the advertising machine.
    #[inline]
    pub fn instance(&self) -> &Label {
        &self.instance
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn txt(&self) -> &TxtData {
        &self.txt
    }

    #[inline]
    pub fn txt_mut(&mut self) -> &mut TxtData {
        &mut self.txt
    }

    /// Returns the domain of this specific instance below `parent`, e.g.
    /// `web._http._tcp.local`.
    pub(crate) fn instance_domain(&self, parent: &DomainName) -> DomainName {
        let mut domain = DomainName::from_iter([&self.instance]);
        domain.extend(&self.ty.domain(parent));
        domain
    }

    /// Returns the browsing domain of this instance's service type below
    /// `parent`.
    pub(crate) fn service_domain(&self, parent: &DomainName) -> DomainName {
        self.ty.domain(parent)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} port {}", self.instance, self.ty, self.port)
    }
}

/// List of `key[=value]` entries stored in the DNS-SD TXT record of a
/// service instance.
///
/// Keys are matched case-insensitively; the first registration of a key wins
/// against later duplicates, matching how DNS-SD clients interpret repeated
/// keys.
#[derive(Clone, Debug, Default)]
pub struct TxtData {
    // keyed by the lowercased key
    map: BTreeMap<String, TxtEntry>,
}

#[derive(Clone, Debug)]
struct TxtEntry {
    key: String,
    value: Option<Vec<u8>>,
}

impl TxtData {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Adds a `key=value` entry.
    pub fn add(&mut self, key: impl Into<String>, value: impl AsRef<[u8]>) {
        self.insert(key.into(), Some(value.as_ref().to_vec()));
    }

    /// Adds a boolean attribute with no value.
    pub fn add_flag(&mut self, key: impl Into<String>) {
        self.insert(key.into(), None);
    }

    fn insert(&mut self, key: String, value: Option<Vec<u8>>) {
        let entry = self.map.entry(key.to_ascii_lowercase());
        if let Entry::Occupied(_) = entry {
            log::debug!("TXT key '{}' already present, ignoring", entry.key());
        }
        entry.or_insert(TxtEntry { key, value });
    }

    /// Returns an iterator over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TxtValue<'_>)> {
        self.map.values().map(|rec| match &rec.value {
            Some(v) => (rec.key.as_str(), TxtValue::Value(v)),
            None => (rec.key.as_str(), TxtValue::NoValue),
        })
    }

    pub fn get(&self, key: &str) -> Option<TxtValue<'_>> {
        self.map
            .get(&key.to_ascii_lowercase())
            .map(|rec| match &rec.value {
                Some(v) => TxtValue::Value(v),
                None => TxtValue::NoValue,
            })
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Builds the wire TXT record for these entries.
    ///
    /// DNS-SD requires the TXT record to exist even when there is no
    /// metadata, in which case it contains a single empty string.
    pub(crate) fn to_record(&self) -> TXT<'static> {
        if self.map.is_empty() {
            return TXT::new([Vec::new()]);
        }

        TXT::new(self.iter().map(|(key, value)| match value {
            TxtValue::NoValue => key.as_bytes().to_vec(),
            TxtValue::Value(v) => {
                let mut kv = key.as_bytes().to_vec();
                kv.push(b'=');
                kv.extend_from_slice(v);
                kv
            }
        }))
    }
}

impl fmt::Display for TxtData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rec) in self.map.values().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }

            f.write_str(&rec.key)?;
            match &rec.value {
                Some(v) => {
                    f.write_str("=")?;
                    v.escape_ascii().fmt(f)?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// The value part of a [`TxtData`] entry.
#[derive(PartialEq, Eq)]
pub enum TxtValue<'a> {
    NoValue,
    Value(&'a [u8]),
}

impl<'a> fmt::Debug for TxtValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValue => f.write_str("-"),
            Self::Value(v) => match std::str::from_utf8(v) {
                Ok(s) => s.fmt(f),
                Err(_) => {
                    for byte in *v {
                        byte.escape_ascii().fmt(f)?;
                    }
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_canonicalization() {
        let with = ServiceType::new("_http", Transport::Tcp).unwrap();
        let without = ServiceType::new("http", Transport::Tcp).unwrap();
        assert_eq!(with, without);
        assert_eq!(with.to_string(), "_http._tcp");
    }

    #[test]
    fn service_type_parse() {
        let ty: ServiceType = "_osc._udp".parse().unwrap();
        assert_eq!(ty.name().as_bytes(), b"_osc");
        assert_eq!(ty.transport(), Transport::Udp);

        let ty: ServiceType = "ipp.tcp".parse().unwrap();
        assert_eq!(ty.to_string(), "_ipp._tcp");

        assert_eq!("_http".parse::<ServiceType>(), Err(Error::InvalidServiceType));
        assert_eq!(
            "_http._quic".parse::<ServiceType>(),
            Err(Error::InvalidServiceType),
        );
    }

    #[test]
    fn service_domains() {
        let local: DomainName = "local".parse().unwrap();
        let ty = ServiceType::new("http", Transport::Tcp).unwrap();
        let rec = ServiceRecord::new(ty, Label::new("web"), 8080);
        assert_eq!(rec.service_domain(&local).to_string(), "_http._tcp.local.");
        assert_eq!(
            rec.instance_domain(&local).to_string(),
            "web._http._tcp.local.",
        );
    }

    #[test]
    fn txt_entries() {
        let mut txt = TxtData::new();
        txt.add("path", "/index.html");
        txt.add_flag("secure");
        txt.add("Path", "/other"); // duplicate key, ignored

        assert_eq!(txt.get("PATH"), Some(TxtValue::Value(b"/index.html")));
        assert_eq!(txt.get("secure"), Some(TxtValue::NoValue));
        assert_eq!(txt.get("missing"), None);

        let record = txt.to_record();
        let entries = record.entries().collect::<Vec<_>>();
        assert_eq!(entries, [&b"path=/index.html"[..], &b"secure"[..]]);
    }

    #[test]
    fn txt_empty_record() {
        let txt = TxtData::new();
        let record = txt.to_record();
        assert_eq!(record.entries().collect::<Vec<_>>(), [&b""[..]]);
    }
}
