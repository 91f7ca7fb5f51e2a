//! Per-listener zone store and record synthesizer.

use crate::config::Config;
use crate::dns::record::{
    is_challenge_name, normalize, RecordData, ZoneRecord, CHALLENGE_TTL, DEFAULT_TTL,
};
use crate::error::Error;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, error};
use trust_dns_client::rr::LowerName;
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_proto::rr::{Name, RecordType};

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day][hour]");
}

/// Records for one zone, keyed by normalized owner name.
///
/// Built once when a listener is constructed. Only the SOA entry may be replaced afterwards, and
/// only before the listener starts serving.
#[derive(Debug, Clone)]
pub struct Zone {
    authority_domain: LowerName,
    ns_name: LowerName,
    ns_ip: Ipv4Addr,
    ingress_ip: Ipv4Addr,
    records: HashMap<LowerName, Vec<ZoneRecord>>,
    soa: Option<ZoneRecord>,
}

/// The SOA serial for the current hour, formatted as `YYYYMMDDHH`.
pub fn current_serial() -> u32 {
    // NB: unwraps are safe: known date format producing values that will always parse as u32.
    OffsetDateTime::now_utc()
        .format(&SERIAL_FORMATTER)
        .unwrap()
        .parse()
        .unwrap()
}

impl Zone {
    pub fn new(config: &Config) -> Self {
        Self::with_serial(config, current_serial())
    }

    /// Build the zone with a fixed SOA serial.
    ///
    /// A SOA that can't be built is logged and left out: the zone still serves, but negative
    /// answers carry no authority section.
    pub fn with_serial(config: &Config, serial: u32) -> Self {
        let mut zone = Zone {
            authority_domain: config.authority_domain(),
            ns_name: config.ns_name(),
            ns_ip: config.ns_ip,
            ingress_ip: config.ingress_ip,
            records: HashMap::default(),
            soa: None,
        };

        match Self::soa_record(config, serial) {
            Ok(soa) => zone.set_soa(Some(soa)),
            Err(err) => error!("error while adding SOA record: {err}"),
        }

        match config.static_records() {
            Ok(records) => records.into_iter().for_each(|r| zone.insert(r)),
            Err(err) => error!("error while adding static records: {err}"),
        }
        zone
    }

    /// Build the SOA record described by the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if the admin contact isn't a valid domain name.
    pub fn soa_record(config: &Config, serial: u32) -> Result<ZoneRecord, Error> {
        // See RFC 1912 section 2.2 for recommended values.
        let soa = SOA::new(
            config.ns_name().into(),
            config.ns_admin()?,
            serial,
            28_800,  // 8 hrs.
            7_200,   // 2 hrs.
            604_800, // 1 week.
            86_400,  // 1 day.
        );
        Ok(ZoneRecord::new(
            config.soa_domain().into(),
            DEFAULT_TTL,
            RecordData::SOA(soa),
        ))
    }

    pub fn authority_domain(&self) -> &LowerName {
        &self.authority_domain
    }

    pub fn soa(&self) -> Option<&ZoneRecord> {
        self.soa.as_ref()
    }

    /// Replace the zone SOA, both as the negative-answer authority record and as a stored
    /// record of its owner.
    pub fn set_soa(&mut self, soa: Option<ZoneRecord>) {
        if let Some(old) = self.soa.take() {
            let owner = normalize(old.owner());
            if let Some(records) = self.records.get_mut(&owner) {
                records.retain(|r| r.record_type() != RecordType::SOA);
                if records.is_empty() {
                    self.records.remove(&owner);
                }
            }
        }
        if let Some(soa) = &soa {
            self.insert(soa.clone());
        }
        self.soa = soa;
    }

    fn insert(&mut self, record: ZoneRecord) {
        let owner = normalize(record.owner());
        debug!(
            domain = %owner,
            record_type = %record.record_type(),
            "adding record to zone"
        );
        self.records.entry(owner).or_default().push(record);
    }

    /// Whether the name is the authority domain itself or has stored records.
    pub fn answering_for(&self, name: &LowerName) -> bool {
        *name == self.authority_domain || self.records.contains_key(name)
    }

    /// Whether the name, or any name above it, is answered for.
    pub fn is_authoritative(&self, name: &LowerName) -> bool {
        let mut name = name.clone();
        loop {
            if self.answering_for(&name) {
                return true;
            }
            if name.is_root() {
                return false;
            }
            name = name.base_name();
        }
    }

    /// Whether the name is `_acme-challenge.<authority domain>`, the record proving control of
    /// this server's own domain. Challenges for names below the authority domain don't count.
    pub fn is_own_challenge(&self, name: &LowerName) -> bool {
        is_challenge_name(name, &self.authority_domain)
    }

    /// Stored records of exactly `rtype`, or failing that the CNAME records of the name.
    pub fn stored(&self, name: &LowerName, rtype: RecordType) -> Vec<ZoneRecord> {
        let Some(records) = self.records.get(name) else {
            debug!(domain = %name, "no records for domain");
            return Vec::new();
        };
        let matching: Vec<ZoneRecord> = records
            .iter()
            .filter(|r| r.record_type() == rtype)
            .cloned()
            .collect();
        if !matching.is_empty() {
            return matching;
        }
        records
            .iter()
            .filter(|r| r.record_type() == RecordType::CNAME)
            .cloned()
            .collect()
    }

    /// Stored records for the query plus whatever must be synthesized for it.
    ///
    /// `A` and `NS` queries with nothing stored get an answer pointing at this server. A `TXT`
    /// query for the own challenge name gets the `challenge` value, even when it is empty.
    pub fn records_for(
        &self,
        name: &Name,
        rtype: RecordType,
        challenge: Option<&str>,
    ) -> Vec<ZoneRecord> {
        let lower = normalize(name);
        let mut records = self.stored(&lower, rtype);

        if records.is_empty() {
            match rtype {
                RecordType::A => {
                    let addr = if lower == self.ns_name {
                        self.ns_ip
                    } else {
                        self.ingress_ip
                    };
                    records.push(ZoneRecord::new(
                        name.clone(),
                        DEFAULT_TTL,
                        RecordData::A(addr),
                    ));
                }
                RecordType::NS => records.push(ZoneRecord::new(
                    name.clone(),
                    DEFAULT_TTL,
                    RecordData::NS(self.ns_name.clone().into()),
                )),
                _ => {}
            }
        }

        if rtype == RecordType::TXT && self.is_own_challenge(&lower) {
            if let Some(token) = challenge {
                records.push(ZoneRecord::new(
                    name.clone(),
                    CHALLENGE_TTL,
                    RecordData::TXT(token.to_string()),
                ));
            }
        }
        records
    }
}
