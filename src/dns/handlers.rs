use crate::challenge::ChallengeToken;
use crate::dns::record::{normalize, ZoneRecord};
use crate::dns::zone::Zone;
use tracing::debug;
use trust_dns_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::RecordType;

/// UDP payload size advertised in every EDNS0 reply.
pub const EDNS_UDP_PAYLOAD: u16 = 512;

/// The outcome of resolving a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub records: Vec<ZoneRecord>,
    pub response_code: ResponseCode,
    pub authoritative: bool,
}

/// Resolves queries against one [`Zone`] and the live challenge value of its listener.
#[derive(Debug)]
pub struct Handler {
    zone: Zone,
    challenge: ChallengeToken,
}

impl Handler {
    pub fn new(zone: Zone, challenge: ChallengeToken) -> Self {
        Handler { zone, challenge }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub(super) fn zone_mut(&mut self) -> &mut Zone {
        &mut self.zone
    }

    pub fn challenge(&self) -> &ChallengeToken {
        &self.challenge
    }

    /// Build the reply to a decoded request.
    ///
    /// Requests with an EDNS version other than 0 get `BADVERS` and nothing else. Otherwise only
    /// `QUERY` requests are resolved; any other opcode gets an empty `NOERROR` reply.
    pub async fn handle_message(&self, request: &Message) -> Message {
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(request.op_code())
            .set_recursion_desired(request.recursion_desired())
            .set_checking_disabled(request.checking_disabled())
            .add_queries(request.queries().iter().cloned());

        match request.extensions() {
            Some(edns) if edns.version() != 0 => {
                debug!(
                    id = request.id(),
                    version = edns.version(),
                    "unsupported EDNS version"
                );
                response.set_response_code(ResponseCode::BADVERS);
                response.set_edns(reply_edns());
            }
            Some(_) => {
                response.set_edns(reply_edns());
                if request.op_code() == OpCode::Query {
                    self.read_query(&mut response).await;
                }
            }
            None => {
                if request.op_code() == OpCode::Query {
                    self.read_query(&mut response).await;
                }
            }
        }
        response
    }

    async fn read_query(&self, response: &mut Message) {
        let mut authoritative = false;
        let queries = response.queries().to_vec();
        for query in &queries {
            let answer = self.answer(query).await;
            authoritative |= answer.authoritative;
            response.set_response_code(answer.response_code);
            response.add_answers(answer.records.iter().map(ZoneRecord::to_record));
        }
        response.set_authoritative(authoritative);

        if authoritative && response.response_code() == ResponseCode::NXDomain {
            if let Some(soa) = self.zone.soa() {
                response.add_name_server(soa.to_record());
            }
        }
    }

    /// Resolve one question.
    ///
    /// Names that are neither the own challenge name nor directly answered for start out as
    /// `NXDOMAIN`; any record found, synthesized ones included, turns that into `NOERROR`.
    pub async fn answer(&self, query: &Query) -> Answer {
        let name = query.name();
        let rtype = query.query_type();
        let lower = normalize(name);
        let authoritative = self.zone.is_authoritative(&lower);
        let own_challenge = self.zone.is_own_challenge(&lower);

        let mut response_code = ResponseCode::NoError;
        if !own_challenge && !self.zone.answering_for(&lower) {
            response_code = ResponseCode::NXDomain;
        }

        let challenge = if rtype == RecordType::TXT && own_challenge {
            Some(self.challenge.get().await)
        } else {
            None
        };
        let records = self.zone.records_for(name, rtype, challenge.as_deref());
        if !records.is_empty() {
            response_code = ResponseCode::NoError;
        }

        debug!(
            qtype = %rtype,
            domain = %name,
            rcode = %response_code,
            "answering question for domain"
        );
        Answer {
            records,
            response_code,
            authoritative,
        }
    }
}

fn reply_edns() -> Edns {
    let mut edns = Edns::new();
    edns.set_max_payload(EDNS_UDP_PAYLOAD);
    edns.set_version(0);
    edns.set_dnssec_ok(false);
    edns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::record::{RecordData, CHALLENGE_TTL};
    use crate::dns::zone::tests::config;
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use trust_dns_proto::rr::rdata::TXT;
    use trust_dns_proto::rr::{Name, RData};

    fn handler() -> Handler {
        Handler::new(
            Zone::with_serial(&config(), 2_024_010_112),
            ChallengeToken::default(),
        )
    }

    fn request(name: &str, rtype: RecordType) -> Message {
        let mut message = Message::new();
        message
            .set_id(4242)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_str(name).unwrap(), rtype));
        message
    }

    fn with_edns(mut message: Message, version: u8) -> Message {
        let mut edns = Edns::new();
        edns.set_version(version);
        edns.set_max_payload(4096);
        message.set_edns(edns);
        message
    }

    fn txt_strings(message: &Message) -> Vec<String> {
        message
            .answers()
            .iter()
            .filter_map(|r| match r.data() {
                Some(RData::TXT(txt)) => Some(txt_string(txt)),
                _ => None,
            })
            .collect()
    }

    fn txt_string(txt: &TXT) -> String {
        txt.txt_data()
            .iter()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn reply_mirrors_request_header() {
        let handler = handler();
        let req = request("example.com.", RecordType::NS);
        let resp = handler.handle_message(&req).await;
        assert_eq!(resp.id(), 4242);
        assert_eq!(resp.message_type(), MessageType::Response);
        assert_eq!(resp.op_code(), OpCode::Query);
        assert!(resp.recursion_desired());
        assert_eq!(resp.queries(), req.queries());
        assert!(resp.extensions().is_none());
    }

    #[tokio::test]
    async fn scenario() {
        let handler = handler();

        let resp = handler
            .handle_message(&request("ns1.example.com.", RecordType::A))
            .await;
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(
            resp.answers()[0].data(),
            Some(&RData::A(Ipv4Addr::new(198, 51, 100, 5)))
        );
        assert_eq!(resp.answers()[0].ttl(), 3600);

        let resp = handler
            .handle_message(&request("foo.example.com.", RecordType::A))
            .await;
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(
            resp.answers()[0].data(),
            Some(&RData::A(Ipv4Addr::new(203, 0, 113, 10)))
        );

        let resp = handler
            .handle_message(&request("example.com.", RecordType::NS))
            .await;
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(
            resp.answers()[0].data(),
            Some(&RData::NS(Name::from_str("ns1.example.com.").unwrap()))
        );
        assert!(resp.authoritative());

        let challenge = request("_acme-challenge.example.com.", RecordType::TXT);
        let resp = handler.handle_message(&challenge).await;
        assert_eq!(txt_strings(&resp), vec![""]);

        handler.challenge().set("tok123").await;
        let resp = handler.handle_message(&challenge).await;
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert_eq!(txt_strings(&resp), vec!["tok123"]);
        assert_eq!(resp.answers()[0].ttl(), CHALLENGE_TTL);

        handler.challenge().clear().await;
        let resp = handler.handle_message(&challenge).await;
        assert_eq!(txt_strings(&resp), vec![""]);
    }

    #[tokio::test]
    async fn authoritative_miss_carries_soa() {
        let handler = handler();
        let resp = handler
            .handle_message(&request("missing.example.com.", RecordType::TXT))
            .await;
        assert_eq!(resp.response_code(), ResponseCode::NXDomain);
        assert!(resp.authoritative());
        assert!(resp.answers().is_empty());
        assert_eq!(resp.name_servers().len(), 1);
        assert_eq!(
            resp.name_servers()[0],
            handler.zone().soa().unwrap().to_record()
        );
    }

    #[tokio::test]
    async fn foreign_miss_has_no_soa() {
        let handler = handler();
        let resp = handler
            .handle_message(&request("example.org.", RecordType::TXT))
            .await;
        assert_eq!(resp.response_code(), ResponseCode::NXDomain);
        assert!(!resp.authoritative());
        assert!(resp.name_servers().is_empty());
    }

    #[tokio::test]
    async fn foreign_a_query_is_still_answered() {
        let handler = handler();
        let answer = handler
            .answer(&Query::query(
                Name::from_str("example.org.").unwrap(),
                RecordType::A,
            ))
            .await;
        assert_eq!(answer.response_code, ResponseCode::NoError);
        assert!(!answer.authoritative);
        assert_eq!(
            answer.records[0].data(),
            &RecordData::A(Ipv4Addr::new(203, 0, 113, 10))
        );
    }

    #[tokio::test]
    async fn soa_query() {
        let handler = handler();
        let resp = handler
            .handle_message(&request("example.com.", RecordType::SOA))
            .await;
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(resp.answers()[0].record_type(), RecordType::SOA);
    }

    #[tokio::test]
    async fn degraded_zone_omits_soa() {
        let mut handler = handler();
        handler.zone_mut().set_soa(None);
        let resp = handler
            .handle_message(&request("missing.example.com.", RecordType::TXT))
            .await;
        assert_eq!(resp.response_code(), ResponseCode::NXDomain);
        assert!(resp.authoritative());
        assert!(resp.name_servers().is_empty());
    }

    #[tokio::test]
    async fn edns_version_zero_is_echoed() {
        let handler = handler();
        let req = with_edns(request("foo.example.com.", RecordType::A), 0);
        let resp = handler.handle_message(&req).await;
        let edns = resp.extensions().as_ref().unwrap();
        assert_eq!(edns.max_payload(), EDNS_UDP_PAYLOAD);
        assert_eq!(edns.version(), 0);
        assert!(!edns.dnssec_ok());
        assert_eq!(resp.answers().len(), 1);
    }

    #[tokio::test]
    async fn bad_edns_version() {
        let handler = handler();
        handler.challenge().set("tok123").await;
        for (name, rtype) in [
            ("ns1.example.com.", RecordType::A),
            ("_acme-challenge.example.com.", RecordType::TXT),
            ("example.org.", RecordType::NS),
        ] {
            let req = with_edns(request(name, rtype), 1);
            let resp = handler.handle_message(&req).await;
            assert_eq!(resp.response_code(), ResponseCode::BADVERS, "{name}");
            assert!(resp.answers().is_empty());
            assert!(resp.name_servers().is_empty());
            let edns = resp.extensions().as_ref().unwrap();
            assert_eq!(edns.max_payload(), EDNS_UDP_PAYLOAD);
        }
    }

    #[tokio::test]
    async fn non_query_opcode_gets_empty_reply() {
        let handler = handler();
        let mut req = request("foo.example.com.", RecordType::A);
        req.set_op_code(OpCode::Status);
        let resp = handler.handle_message(&req).await;
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert!(resp.answers().is_empty());

        let req = with_edns(req, 0);
        let resp = handler.handle_message(&req).await;
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert!(resp.answers().is_empty());
        assert!(resp.extensions().is_some());
    }

    #[tokio::test]
    async fn unsupported_type_is_not_an_error() {
        let handler = handler();
        let resp = handler
            .handle_message(&request("example.com.", RecordType::AAAA))
            .await;
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert!(resp.answers().is_empty());
        assert!(resp.authoritative());
    }

    #[tokio::test]
    async fn every_question_is_answered() {
        let handler = handler();
        let mut req = request("ns1.example.com.", RecordType::A);
        req.add_query(Query::query(
            Name::from_str("example.com.").unwrap(),
            RecordType::NS,
        ));
        let resp = handler.handle_message(&req).await;
        assert_eq!(resp.queries().len(), 2);
        assert_eq!(resp.answers().len(), 2);
        assert!(resp.authoritative());
    }

    #[tokio::test]
    async fn wire_round_trip_keeps_badvers() {
        let handler = handler();
        let req = with_edns(request("example.com.", RecordType::SOA), 1);
        let bytes = handler.handle_message(&req).await.to_vec().unwrap();
        let decoded = Message::from_vec(&bytes).unwrap();
        // BADVERS and BADSIG share code 16, the decoder picks BADSIG.
        assert_eq!(
            u16::from(decoded.response_code()),
            u16::from(ResponseCode::BADVERS)
        );
    }
}
