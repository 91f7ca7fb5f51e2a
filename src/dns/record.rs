//! Resource records served from a [`Zone`][super::zone::Zone].

use crate::config::StaticRecord;
use crate::error::Error;
use std::net::Ipv4Addr;
use std::str::FromStr;
use trust_dns_proto::rr::rdata::{SOA, TXT};
use trust_dns_client::rr::LowerName;
use trust_dns_proto::rr::{Name, RData, Record, RecordType};

/// TTL of synthesized and static records.
pub const DEFAULT_TTL: u32 = 3600;

/// TTL of the challenge TXT record.
pub const CHALLENGE_TTL: u32 = 1;

const CHALLENGE_LABEL: &[u8] = b"_acme-challenge";

// Longest single <character-string> in TXT RDATA.
const MAX_CHARACTER_STRING: usize = 255;

/// Lower-case a name and make it fully qualified.
pub fn normalize(name: &Name) -> LowerName {
    let mut name = name.to_lowercase();
    name.set_fqdn(true);
    LowerName::new(&name)
}

/// Whether `name` is `_acme-challenge.<domain>`. Both names must be normalized.
pub fn is_challenge_name(name: &LowerName, domain: &LowerName) -> bool {
    match Name::from(name.clone()).iter().next() {
        Some(label) if label.eq_ignore_ascii_case(CHALLENGE_LABEL) => name.base_name() == *domain,
        _ => false,
    }
}

/// The record types this server knows how to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    NS(Name),
    SOA(SOA),
    TXT(String),
    CNAME(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    owner: Name,
    ttl: u32,
    data: RecordData,
}

impl ZoneRecord {
    pub fn new(owner: Name, ttl: u32, data: RecordData) -> Self {
        ZoneRecord { owner, ttl, data }
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    pub fn record_type(&self) -> RecordType {
        match self.data {
            RecordData::A(_) => RecordType::A,
            RecordData::NS(_) => RecordType::NS,
            RecordData::SOA(_) => RecordType::SOA,
            RecordData::TXT(_) => RecordType::TXT,
            RecordData::CNAME(_) => RecordType::CNAME,
        }
    }

    /// Build a record from a [`Config::records`][crate::config::Config::records] entry. Owner
    /// and target names are normalized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStaticRecord`] when the type isn't one of `A`, `NS`, `TXT` or
    /// `CNAME`, or the value doesn't parse for that type.
    pub fn from_static(owner: &Name, entry: &StaticRecord) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidStaticRecord {
            name: owner.to_string(),
            rtype: entry.rtype.clone(),
            reason,
        };
        let target = || {
            Name::from_str(&entry.value)
                .map(|n| Name::from(normalize(&n)))
                .map_err(|err| invalid(err.to_string()))
        };
        let data = match entry.rtype.to_ascii_uppercase().as_str() {
            "A" => RecordData::A(
                Ipv4Addr::from_str(&entry.value).map_err(|err| invalid(err.to_string()))?,
            ),
            "NS" => RecordData::NS(target()?),
            "CNAME" => RecordData::CNAME(target()?),
            "TXT" => RecordData::TXT(entry.value.clone()),
            _ => return Err(invalid("unsupported record type".to_string())),
        };
        Ok(ZoneRecord::new(
            Name::from(normalize(owner)),
            DEFAULT_TTL,
            data,
        ))
    }

    /// Convert into a wire record.
    pub fn to_record(&self) -> Record {
        let rdata = match &self.data {
            RecordData::A(addr) => RData::A(*addr),
            RecordData::NS(target) => RData::NS(target.clone()),
            RecordData::SOA(soa) => RData::SOA(soa.clone()),
            RecordData::TXT(text) => RData::TXT(txt_rdata(text)),
            RecordData::CNAME(target) => RData::CNAME(target.clone()),
        };
        Record::from_rdata(self.owner.clone(), self.ttl, rdata)
    }
}

// Splits on char boundaries so every piece stays valid UTF-8. An empty value still yields one
// (empty) character-string.
fn txt_rdata(text: &str) -> TXT {
    let mut strings = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if current.len() + c.len_utf8() > MAX_CHARACTER_STRING {
            strings.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    strings.push(current);
    TXT::new(strings)
}
