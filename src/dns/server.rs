use crate::config::{Config, ListenMode, Transport};
use crate::dns::listener::Listener;
use crate::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The DNS listeners built from one [`Config`], started and stopped together.
///
/// In `both` mode the group holds a UDP and a TCP listener on the same address. Their zones
/// are built independently, but the TCP listener gets a copy of the UDP listener's SOA so both
/// report the same serial.
#[derive(Debug)]
pub struct ServerGroup {
    listeners: Vec<Arc<Listener>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerGroup {
    pub fn new(config: &Config) -> Self {
        let addr = config.dns_listen;
        let listeners = match config.dns_protocol {
            ListenMode::Both(family) => {
                let udp = Listener::new(addr, Transport::udp(family), config);
                let mut tcp = Listener::new(addr, Transport::tcp(family), config);
                tcp.set_soa(udp.soa().cloned());
                vec![udp, tcp]
            }
            ListenMode::Single(transport) => vec![Listener::new(addr, transport, config)],
        };
        ServerGroup {
            listeners: listeners.into_iter().map(Arc::new).collect(),
            tasks: Vec::new(),
        }
    }

    pub fn listeners(&self) -> &[Arc<Listener>] {
        &self.listeners
    }

    /// Spawn every listener. Fatal listener errors arrive on `errors`, one per failed listener.
    ///
    /// Must be called from within a tokio runtime. Calling it again while the group is running
    /// does nothing.
    pub fn start(&mut self, errors: &mpsc::Sender<Error>) {
        if !self.tasks.is_empty() {
            return;
        }
        for listener in &self.listeners {
            info!(
                addr = %listener.addr(),
                transport = %listener.transport(),
                "starting DNS listener"
            );
            self.tasks
                .push(tokio::spawn(Arc::clone(listener).start(errors.clone())));
        }
    }

    /// Stop every listener and wait for in-flight replies to drain.
    ///
    /// Every listener is shut down even when some fail; failures are logged.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Join`] if a listener task panicked.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        for listener in &self.listeners {
            listener.shutdown();
        }
        let mut first_err = None;
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                error!("failed to shut down DNS listener: {err}");
                first_err.get_or_insert(Error::Join(err));
            }
        }
        info!("DNS listeners stopped");
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IpFamily, Protocol};
    use crate::dns::zone::tests::config;
    use trust_dns_proto::serialize::binary::BinEncodable;

    #[test]
    fn both_mode_builds_udp_and_tcp() {
        let mut config = config();
        config.dns_protocol = ListenMode::Both(IpFamily::V4);
        let group = ServerGroup::new(&config);
        let transports: Vec<Transport> = group.listeners().iter().map(|l| l.transport()).collect();
        assert_eq!(
            transports,
            vec![Transport::udp(IpFamily::V4), Transport::tcp(IpFamily::V4)]
        );
    }

    #[test]
    fn both_mode_shares_soa_bytes() {
        let group = ServerGroup::new(&config());
        let [udp, tcp] = group.listeners() else {
            panic!("expected two listeners");
        };
        let udp_soa = udp.soa().unwrap().to_record().to_bytes().unwrap();
        let tcp_soa = tcp.soa().unwrap().to_record().to_bytes().unwrap();
        assert_eq!(udp_soa, tcp_soa);
    }

    #[tokio::test]
    async fn listeners_have_independent_tokens() {
        let group = ServerGroup::new(&config());
        let [udp, tcp] = group.listeners() else {
            panic!("expected two listeners");
        };
        udp.challenge().set("udp-only").await;
        assert_eq!(udp.challenge().get().await, "udp-only");
        assert_eq!(tcp.challenge().get().await, "");
    }

    #[test]
    fn single_mode_builds_one_listener() {
        let mut config = config();
        config.dns_protocol = ListenMode::Single(Transport::tcp(IpFamily::Any));
        let group = ServerGroup::new(&config);
        assert_eq!(group.listeners().len(), 1);
        assert_eq!(group.listeners()[0].transport().protocol, Protocol::Tcp);
    }

    #[tokio::test]
    async fn start_and_shutdown() {
        let mut config = config();
        config.dns_listen = "127.0.0.1:0".parse().unwrap();
        let mut group = ServerGroup::new(&config);
        let (tx, mut rx) = mpsc::channel(2);
        group.start(&tx);
        group.shutdown().await.unwrap();
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
