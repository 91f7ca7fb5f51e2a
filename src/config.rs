use crate::dns::record::{is_challenge_name, normalize, ZoneRecord};
use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationSeconds};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_client::rr::LowerName;
use trust_dns_proto::rr::Name;

pub type Shared = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// The zone this server is authoritative for, and whose own `_acme-challenge` TXT record
    /// is served from the challenge token.
    pub domain: Name,
    /// Owner of the zone SOA record. Defaults to [`Config::domain`].
    #[serde(default)]
    pub soa_domain: Option<Name>,
    pub ns_name: Name,
    pub ns_admin: String,
    /// Address served for `A` queries of [`Config::ns_name`].
    pub ns_ip: Ipv4Addr,
    /// Address served for every other synthesized `A` query.
    pub ingress_ip: Ipv4Addr,
    #[serde(default = "default_dns_listen")]
    pub dns_listen: SocketAddr,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub dns_protocol: ListenMode,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub dns_tcp_timeout: Duration,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub api_timeout: Duration,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub records: HashMap<Name, Vec<StaticRecord>>,
}

/// A statically configured resource record, e.g. `{"type": "CNAME", "value": "example.com"}`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StaticRecord {
    #[serde(rename = "type")]
    pub rtype: String,
    pub value: String,
}

fn default_dns_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_api_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

impl Config {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the file can't be read, [`Error::InvalidJSON`] if it isn't a
    /// valid config, or any error from [`Config::validate`].
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check the settings that deserialization alone can't.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsecureAPIBind`] for a public API bind address, and
    /// [`Error::InvalidStaticRecord`] if any of [`Config::records`] can't be loaded.
    pub fn validate(&self) -> Result<(), Error> {
        self.bind_addr_is_secure()?;
        self.static_records()?;
        Ok(())
    }

    /// The normalized authority domain.
    pub fn authority_domain(&self) -> LowerName {
        normalize(&self.domain)
    }

    pub fn soa_domain(&self) -> LowerName {
        normalize(self.soa_domain.as_ref().unwrap_or(&self.domain))
    }

    pub fn ns_name(&self) -> LowerName {
        normalize(&self.ns_name)
    }

    pub fn ns_admin(&self) -> Result<Name, Error> {
        let mut admin = Name::from_str(&self.sanitized_ns_admin())?;
        admin.set_fqdn(true);
        Ok(admin.to_lowercase())
    }

    /// Every entry of [`Config::records`] as a zone record, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStaticRecord`] for the first entry that can't be parsed, or that
    /// is owned by `_acme-challenge.<domain>`. That name only ever holds the challenge value.
    pub fn static_records(&self) -> Result<Vec<ZoneRecord>, Error> {
        let domain = self.authority_domain();
        let mut owners: Vec<&Name> = self.records.keys().collect();
        owners.sort();
        let mut records = Vec::new();
        for owner in owners {
            for entry in &self.records[owner] {
                if is_challenge_name(&normalize(owner), &domain) {
                    return Err(Error::InvalidStaticRecord {
                        name: owner.to_string(),
                        rtype: entry.rtype.clone(),
                        reason: "reserved for the ACME challenge".to_string(),
                    });
                }
                records.push(ZoneRecord::from_static(owner, entry)?);
            }
        }
        Ok(records)
    }

    fn sanitized_ns_admin(&self) -> Cow<str> {
        match self.ns_admin.split_once('@') {
            Some((user, domain)) => {
                let user = user.replace('.', "\\.");
                Cow::Owned(format!("{user}.{domain}"))
            }
            _ => Cow::Borrowed(&self.ns_admin),
        }
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

/// Restricts a listener to one IP family. `Any` binds the configured address as-is, which
/// for an IPv6 wildcard means dual-stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IpFamily {
    #[default]
    Any,
    V4,
    V6,
}

/// The network transport of a single DNS listener, e.g. `udp`, `tcp6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transport {
    pub protocol: Protocol,
    pub family: IpFamily,
}

impl Transport {
    pub fn udp(family: IpFamily) -> Self {
        Transport {
            protocol: Protocol::Udp,
            family,
        }
    }

    pub fn tcp(family: IpFamily) -> Self {
        Transport {
            protocol: Protocol::Tcp,
            family,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.protocol {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        };
        write!(f, "{proto}{}", self.family)
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::Any => Ok(()),
            IpFamily::V4 => f.write_str("4"),
            IpFamily::V6 => f.write_str("6"),
        }
    }
}

/// The `dns_protocol` setting: a single transport, or UDP and TCP together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    Single(Transport),
    Both(IpFamily),
}

impl Default for ListenMode {
    fn default() -> Self {
        ListenMode::Both(IpFamily::Any)
    }
}

impl FromStr for ListenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (proto, family) = match lower.strip_suffix('4') {
            Some(proto) => (proto, IpFamily::V4),
            None => match lower.strip_suffix('6') {
                Some(proto) => (proto, IpFamily::V6),
                None => (lower.as_str(), IpFamily::Any),
            },
        };
        match proto {
            "udp" => Ok(ListenMode::Single(Transport::udp(family))),
            "tcp" => Ok(ListenMode::Single(Transport::tcp(family))),
            "both" => Ok(ListenMode::Both(family)),
            _ => Err(Error::InvalidProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for ListenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenMode::Single(transport) => transport.fmt(f),
            ListenMode::Both(family) => write!(f, "both{family}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "domain": "Example.COM",
            "ns_name": "ns1.example.com",
            "ns_admin": "dns.admin@example.com",
            "ns_ip": "198.51.100.5",
            "ingress_ip": "203.0.113.10",
        })
    }

    #[test]
    fn defaults_apply() {
        let config: Config = serde_json::from_value(base()).unwrap();
        assert_eq!(config.dns_listen, "0.0.0.0:53".parse().unwrap());
        assert_eq!(config.dns_protocol, ListenMode::Both(IpFamily::Any));
        assert_eq!(config.dns_tcp_timeout, Duration::from_secs(10));
        assert_eq!(config.api_bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert!(config.records.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn names_are_normalized() {
        let config: Config = serde_json::from_value(base()).unwrap();
        assert_eq!(config.authority_domain().to_string(), "example.com.");
        assert_eq!(config.soa_domain(), config.authority_domain());
        assert_eq!(config.ns_name().to_string(), "ns1.example.com.");
    }

    #[test]
    fn ns_admin_email_is_sanitized() {
        let config: Config = serde_json::from_value(base()).unwrap();
        let admin = config.ns_admin().unwrap();
        assert!(admin.is_fqdn());
        assert_eq!(admin.num_labels(), 3);
        assert_eq!(admin.iter().next(), Some(&b"dns.admin"[..]));
    }

    #[test]
    fn listen_modes_parse() {
        let cases = [
            ("udp", ListenMode::Single(Transport::udp(IpFamily::Any))),
            ("udp4", ListenMode::Single(Transport::udp(IpFamily::V4))),
            ("TCP6", ListenMode::Single(Transport::tcp(IpFamily::V6))),
            ("both", ListenMode::Both(IpFamily::Any)),
            ("both6", ListenMode::Both(IpFamily::V6)),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<ListenMode>().unwrap(), expected, "{input}");
        }
        assert!(matches!(
            "quic".parse::<ListenMode>(),
            Err(Error::InvalidProtocol(_))
        ));
        assert!("udp5".parse::<ListenMode>().is_err());
    }

    #[test]
    fn transport_display() {
        assert_eq!(Transport::udp(IpFamily::Any).to_string(), "udp");
        assert_eq!(Transport::tcp(IpFamily::V6).to_string(), "tcp6");
        assert_eq!(ListenMode::Both(IpFamily::V4).to_string(), "both4");
    }

    #[test]
    fn public_api_bind_rejected() {
        let mut value = base();
        value["api_bind_addr"] = json!("8.8.8.8:3000");
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(matches!(config.validate(), Err(Error::InsecureAPIBind(_))));

        let mut value = base();
        value["api_bind_addr"] = json!("[fd00::1]:3000");
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn static_records_validated() {
        let mut value = base();
        value["records"] = json!({
            "www.example.com": [ { "type": "CNAME", "value": "example.com" } ],
            "mail.example.com": [ { "type": "A", "value": "not-an-ip" } ],
        });
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidStaticRecord { .. })
        ));
    }

    #[test]
    fn challenge_owner_cannot_have_static_records() {
        let mut value = base();
        value["records"] = json!({
            "_acme-challenge.Example.com": [ { "type": "TXT", "value": "stale" } ],
        });
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidStaticRecord { .. })
        ));

        let mut value = base();
        value["records"] = json!({
            "_acme-challenge.sub.example.com": [ { "type": "TXT", "value": "delegated" } ],
        });
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_protocol_fails_deserialization() {
        let mut value = base();
        value["dns_protocol"] = json!("sctp");
        assert!(serde_json::from_value::<Config>(value).is_err());
    }
}
