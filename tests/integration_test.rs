//! End-to-end tests against a served TcpTransport.

use bytes::{Buf, BytesMut};
use sparkkv::protocol::parse_message;
use sparkkv::{RespValue, Server, ServerConfig, TcpTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct TestServer {
    addr: SocketAddr,
    server: Arc<Server>,
}

async fn create_test_server(config: ServerConfig) -> TestServer {
    let mut transport = TcpTransport::new("127.0.0.1:0");
    let addr = transport.listen_and_accept().await.unwrap();
    let server = Arc::new(Server::new(config));

    let serving = Arc::clone(&server);
    tokio::spawn(async move { serving.serve(&mut transport).await });

    TestServer { addr, server }
}

struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buffer: BytesMut::new(),
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn command(&mut self, args: &[&str]) -> RespValue {
        let frame = RespValue::array(
            args.iter()
                .map(|a| RespValue::bulk_string(a.to_string()))
                .collect(),
        );
        self.send_raw(&frame.serialize().unwrap()).await;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> RespValue {
        let read = async {
            loop {
                if let Some((value, consumed)) = parse_message(&self.buffer).unwrap() {
                    self.buffer.advance(consumed);
                    return value;
                }
                let n = self.stream.read_buf(&mut self.buffer).await.unwrap();
                assert!(n > 0, "server closed the connection");
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read)
            .await
            .expect("timed out waiting for reply")
    }
}

fn map_get<'a>(reply: &'a RespValue, key: &str) -> Option<&'a RespValue> {
    match reply {
        RespValue::Map(pairs) => pairs
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v),
        _ => None,
    }
}

#[tokio::test]
async fn test_set_with_expiry_then_get_after_deadline() {
    let test = create_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(test.addr).await;

    assert_eq!(client.command(&["SET", "k", "v", "EX", "1"]).await, RespValue::ok());
    assert_eq!(client.command(&["GET", "k"]).await, RespValue::bulk_string("v"));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(client.command(&["GET", "k"]).await.is_null());
}

#[tokio::test]
async fn test_set_get_flag_returns_previous_value() {
    let test = create_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(test.addr).await;

    assert_eq!(client.command(&["SET", "k", "v1"]).await, RespValue::ok());
    assert_eq!(
        client.command(&["SET", "k", "v2", "GET"]).await,
        RespValue::bulk_string("v1")
    );
    assert_eq!(client.command(&["GET", "k"]).await, RespValue::bulk_string("v2"));
}

#[tokio::test]
async fn test_suppressed_set_replies() {
    let test = create_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(test.addr).await;

    assert_eq!(client.command(&["SET", "k", "v1"]).await, RespValue::ok());
    assert_eq!(client.command(&["SET", "k", "v2", "NX"]).await, RespValue::ok());
    assert!(client.command(&["SET", "k", "v3", "NX", "GET"]).await.is_null());
    assert_eq!(client.command(&["SET", "missing", "v", "XX"]).await, RespValue::ok());

    assert_eq!(client.command(&["GET", "k"]).await, RespValue::bulk_string("v1"));
    assert!(client.command(&["GET", "missing"]).await.is_null());
}

#[tokio::test]
async fn test_sweeper_purges_unread_keys() {
    let config = ServerConfig {
        sweep_interval_ms: 10,
        ..Default::default()
    };
    let test = create_test_server(config).await;
    let mut client = Client::connect(test.addr).await;

    for i in 0..50 {
        let key = format!("temp:{}", i);
        assert_eq!(
            client.command(&["SET", &key, "v", "PX", "50"]).await,
            RespValue::ok()
        );
    }
    client.command(&["SET", "keep", "v"]).await;
    assert_eq!(test.server.storage().len(), 51);

    let storage = test.server.storage();
    for _ in 0..100 {
        if storage.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(storage.len(), 1);
    assert_eq!(client.command(&["GET", "keep"]).await, RespValue::bulk_string("v"));
}

#[tokio::test]
async fn test_hello_handshake() {
    let test = create_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(test.addr).await;

    let reply = client.command(&["HELLO", "3", "SETNAME", "itest"]).await;
    assert_eq!(map_get(&reply, "server"), Some(&RespValue::bulk_string("redis")));
    assert_eq!(map_get(&reply, "version"), Some(&RespValue::bulk_string("6.0.3")));
    assert_eq!(map_get(&reply, "proto"), Some(&RespValue::integer(3)));
    assert_eq!(map_get(&reply, "mode"), Some(&RespValue::bulk_string("standalone")));

    let id = client.command(&["CLIENT", "ID"]).await;
    assert_eq!(map_get(&reply, "id"), Some(&id));

    assert_eq!(
        client.command(&["CLIENT", "GETNAME"]).await,
        RespValue::bulk_string("itest")
    );

    assert_eq!(
        client.command(&["HELLO", "9"]).await,
        RespValue::error("NOPROTO unsupported protocol version")
    );
}

#[tokio::test]
async fn test_client_setinfo_is_per_connection() {
    let test = create_test_server(ServerConfig::default()).await;
    let mut first = Client::connect(test.addr).await;
    let mut second = Client::connect(test.addr).await;

    assert_eq!(
        first.command(&["CLIENT", "SETINFO", "lib-name", "redis-py"]).await,
        RespValue::ok()
    );
    assert_eq!(
        first.command(&["client", "setname", "first"]).await,
        RespValue::ok()
    );

    assert!(second.command(&["CLIENT", "GETNAME"]).await.is_null());
    assert_eq!(
        first.command(&["CLIENT", "GETNAME"]).await,
        RespValue::bulk_string("first")
    );
}

#[tokio::test]
async fn test_unknown_command_and_bad_frame_keep_connection_open() {
    let test = create_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(test.addr).await;

    assert_eq!(
        client.command(&["FLUSHALL"]).await,
        RespValue::error("ERR unknown command 'flushall'")
    );

    client.send_raw(b"?garbage\r\n").await;
    assert!(client.read_reply().await.is_error());

    assert_eq!(client.command(&["PING"]).await, RespValue::pong());
}

#[tokio::test]
async fn test_pipelined_replies_in_order() {
    let test = create_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(test.addr).await;

    client
        .send_raw(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n")
        .await;

    assert_eq!(client.read_reply().await, RespValue::ok());
    assert_eq!(client.read_reply().await, RespValue::ok());
    assert_eq!(client.read_reply().await, RespValue::bulk_string("v1"));
    assert_eq!(client.read_reply().await, RespValue::bulk_string("v2"));
}

#[tokio::test]
async fn test_many_concurrent_clients() {
    let test = create_test_server(ServerConfig::default()).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let addr = test.addr;
            tokio::spawn(async move {
                let mut client = Client::connect(addr).await;
                let key = format!("client:{}", i);
                let value = format!("value:{}", i);
                assert_eq!(client.command(&["SET", &key, &value]).await, RespValue::ok());
                assert_eq!(
                    client.command(&["GET", &key]).await,
                    RespValue::bulk_string(value)
                );
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(test.server.storage().len(), 20);
}
