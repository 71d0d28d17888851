use ntpstamp::{
    ClientConfig, Error, NTP_PACKET_SIZE, NtpContext, NtpMode, NtpPacket, NtpServer,
    NtpTimestamp, ServeSummary, SocketPolicy, StdBackoff, StdTimestampGen, pack_li_vn_mode,
    sync,
};
use ntpstamp_net_std::{StdTransport, UdpSocketWrapper};

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<ServeSummary>,
}

impl TestServer {
    fn start() -> Self {
        let socket =
            UdpSocketWrapper::bind("127.0.0.1:0", Some(Duration::from_millis(50))).unwrap();
        let addr = socket.local_addr().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || {
            let mut server = NtpServer::new(socket, StdTimestampGen::default());
            sync::run(&mut server, &flag)
        });

        TestServer {
            addr,
            shutdown,
            handle,
        }
    }

    fn stop(self) -> ServeSummary {
        self.shutdown.store(true, Ordering::Relaxed);
        self.handle.join().unwrap()
    }
}

fn transport() -> StdTransport {
    StdTransport::default().with_read_timeout(Some(Duration::from_millis(500)))
}

#[test]
fn client_exchange_with_local_server() {
    let server = TestServer::start();
    let config = ClientConfig::default().with_port(server.addr.port());
    let mut context = NtpContext::new(StdTimestampGen::default()).with_config(config);

    let result = sync::get_time("127.0.0.1", &transport(), &mut context).unwrap();

    assert_eq!(result.stratum(), 2);
    assert_eq!(result.attempts(), 1);
    // Both ends read the same clock
    assert!(result.offset().abs() < 1_000_000, "offset {}", result.offset());
    assert!(result.roundtrip() < 1_000_000, "delay {}", result.roundtrip());

    assert_eq!(
        server.stop(),
        ServeSummary {
            replied: 1,
            discarded: 0
        }
    );
}

/// Answers the first request late with stratum 9 and the second one at once with stratum 2
fn late_responder() -> (SocketAddr, JoinHandle<Vec<SocketAddr>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let addr = socket.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let mut clock = StdTimestampGen::default();
        let mut buf = [0u8; 128];
        let mut clients = Vec::new();

        for (stratum, delay) in [(9, Duration::from_millis(150)), (2, Duration::ZERO)] {
            let (len, client) = socket.recv_from(&mut buf).unwrap();
            assert_eq!(len, NTP_PACKET_SIZE);
            thread::sleep(delay);

            let now = NtpTimestamp::now(&mut clock);
            let reply = NtpPacket {
                li_vn_mode: pack_li_vn_mode(0, 4, NtpMode::Server),
                stratum,
                receive_timestamp: now,
                transmit_timestamp: now,
                ..NtpPacket::default()
            };
            socket.send_to(&reply.encode().0, client).unwrap();
            clients.push(client);
        }

        clients
    });

    (addr, handle)
}

#[test]
fn retry_on_kept_socket_skips_late_reply() {
    let (addr, responder) = late_responder();
    let config = ClientConfig::default()
        .with_socket_policy(SocketPolicy::PerExchange)
        .with_max_attempts(2)
        .with_backoff(Duration::from_millis(300));
    let mut context = NtpContext::new(StdTimestampGen::default())
        .with_backoff(StdBackoff)
        .with_config(config);
    let transport = StdTransport::default().with_read_timeout(Some(Duration::from_millis(100)));

    let result = sync::get_time_from(addr, &transport, &mut context).unwrap();

    assert_eq!(result.attempts(), 2);
    assert_eq!(result.stratum(), 2);

    let clients = responder.join().unwrap();
    assert_eq!(clients.len(), 2);
    assert_eq!(clients[0], clients[1]);
}

#[test]
fn malformed_request_gets_no_reply() {
    let server = TestServer::start();
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let mut buf = [0u8; 128];

    client.send_to(&[0x1b; 47], server.addr).unwrap();
    assert!(client.recv_from(&mut buf).is_err());

    let request = NtpPacket::client_request().encode();
    client.send_to(&request.0, server.addr).unwrap();
    let (len, from) = client.recv_from(&mut buf).unwrap();

    assert_eq!(len, NTP_PACKET_SIZE);
    assert_eq!(from, server.addr);
    let reply = NtpPacket::decode(&buf[..len]).unwrap();
    assert_eq!(reply.mode(), NtpMode::Server);
    assert_eq!(reply.version(), 4);
    assert_eq!(reply.poll, 16);

    assert_eq!(
        server.stop(),
        ServeSummary {
            replied: 1,
            discarded: 1
        }
    );
}

#[test]
fn silent_server_exhausts_retries() {
    // Bound but never answers
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = silent.local_addr().unwrap();
    let config = ClientConfig::default().with_max_attempts(2);
    let mut context = NtpContext::new(StdTimestampGen::default()).with_config(config);
    let transport = StdTransport::default().with_read_timeout(Some(Duration::from_millis(100)));

    let result = sync::get_time_from(addr, &transport, &mut context);

    assert_eq!(result, Err(Error::RetriesExhausted { attempts: 2 }));
}
