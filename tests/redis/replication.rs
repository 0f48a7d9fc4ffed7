use bytes::Bytes;
use redis_replication::{
    input::RespReader,
    rdb::{full_resync_reply, EMPTY_RDB},
    resp::RespValue,
    server::{RedisServer, ServerConfig},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time::timeout,
};

use crate::test_utils::{
    TestClient, TestEnv, TestServer, TestUtils, MASTER_REPLICATION_ID, REPLY_TIMEOUT,
};

const SET_FOO_BAR: &[u8] = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
const GETACK: &[u8] = b"*3\r\n$8\r\nREPLCONF\r\n$6\r\nGETACK\r\n$1\r\n*\r\n";

/// Issues PSYNC on `client` and consumes the full resync reply.
async fn full_resync(client: &mut TestClient) {
    client.send(TestUtils::psync_command()).await;

    assert_eq!(
        client.read_value().await,
        RespValue::simple_string(format!("FULLRESYNC {} 0", MASTER_REPLICATION_ID))
    );

    let snapshot = timeout(REPLY_TIMEOUT, client.reader.read_rdb_payload())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot, Bytes::from_static(EMPTY_RDB));
}

async fn read_exactly<R>(reader: &mut R, length: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut received = vec![0u8; length];
    timeout(REPLY_TIMEOUT, reader.read_exact(&mut received))
        .await
        .expect("timed out waiting for bytes")
        .unwrap();
    received
}

#[tokio::test]
async fn test_psync_registers_replica_and_propagates_writes() {
    let env = TestEnv::new_master_server();
    let mut replica = env.connect("127.0.0.1:6380");
    let mut client = env.connect("127.0.0.1:50100");

    full_resync(&mut replica).await;
    TestUtils::eventually(|| env.replication.replicas().contains("127.0.0.1:6380")).await;

    assert_eq!(
        client.request(TestUtils::set_command("foo", "bar")).await,
        RespValue::simple_string("OK")
    );

    let propagated = timeout(REPLY_TIMEOUT, replica.reader.read_frame())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(propagated.value, TestUtils::set_command("foo", "bar"));
    assert_eq!(propagated.length, SET_FOO_BAR.len());

    assert_eq!(
        client.request(TestUtils::info_command("replication")).await,
        TestUtils::master_info(1, 31)
    );
}

#[tokio::test]
async fn test_reads_are_not_propagated() {
    let env = TestEnv::new_master_server();
    let mut replica = env.connect("127.0.0.1:6380");
    let mut client = env.connect("127.0.0.1:50101");

    full_resync(&mut replica).await;
    TestUtils::eventually(|| env.replication.replicas().len() == 1).await;

    client.request(TestUtils::get_command("foo")).await;
    client.request(TestUtils::echo_command("hey")).await;
    client.request(TestUtils::set_command("a", "1")).await;

    let propagated = TestUtils::read_value(&mut replica.reader).await;
    assert_eq!(propagated, TestUtils::set_command("a", "1"));
}

#[tokio::test]
async fn test_failed_replica_is_pruned_and_others_still_receive() {
    let env = TestEnv::new_master_server();
    let mut first = env.connect("127.0.0.1:6380");
    let mut second = env.connect("127.0.0.1:6381");
    let mut client = env.connect("127.0.0.1:50102");

    full_resync(&mut first).await;
    full_resync(&mut second).await;
    TestUtils::eventually(|| env.replication.replicas().len() == 2).await;

    drop(first);

    for value in ["1", "2", "3"] {
        assert_eq!(
            client.request(TestUtils::set_command("foo", value)).await,
            RespValue::simple_string("OK")
        );
    }

    for value in ["1", "2", "3"] {
        assert_eq!(
            TestUtils::read_value(&mut second.reader).await,
            TestUtils::set_command("foo", value)
        );
    }

    TestUtils::eventually(|| !env.replication.replicas().contains("127.0.0.1:6380")).await;
    assert!(env.replication.replicas().contains("127.0.0.1:6381"));
}

/// Accepts one replica and answers its handshake like a master would.
async fn accept_replica(listener: &TcpListener) -> (RespReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (stream, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = RespReader::new(reader);

    assert_eq!(
        TestUtils::read_value(&mut reader).await,
        RespValue::command(&["PING"])
    );
    writer.write_all(b"+PONG\r\n").await.unwrap();

    let RespValue::Array(Some(listening_port)) = TestUtils::read_value(&mut reader).await else {
        panic!("expected REPLCONF listening-port");
    };
    assert_eq!(
        listening_port[..2],
        [
            RespValue::bulk_string("REPLCONF"),
            RespValue::bulk_string("listening-port")
        ]
    );
    writer.write_all(b"+OK\r\n").await.unwrap();

    assert_eq!(
        TestUtils::read_value(&mut reader).await,
        RespValue::command(&["REPLCONF", "capa", "psync2"])
    );
    writer.write_all(b"+OK\r\n").await.unwrap();

    assert_eq!(
        TestUtils::read_value(&mut reader).await,
        TestUtils::psync_command()
    );
    writer
        .write_all(&full_resync_reply(MASTER_REPLICATION_ID, 0))
        .await
        .unwrap();

    (reader, writer)
}

#[tokio::test]
async fn test_replica_applies_stream_and_reports_offset() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let master_address = listener.local_addr().unwrap();

    let fake_master = tokio::spawn(async move {
        let (mut reader, mut writer) = accept_replica(&listener).await;

        writer.write_all(SET_FOO_BAR).await.unwrap();
        writer.write_all(GETACK).await.unwrap();
        let first_ack = TestUtils::read_value(&mut reader).await;

        writer.write_all(GETACK).await.unwrap();
        let second_ack = TestUtils::read_value(&mut reader).await;

        (first_ack, second_ack, reader, writer)
    });

    let replica = TestServer::start_replica_of(master_address).await.unwrap();
    let (first_ack, second_ack, _reader, _writer) = fake_master.await.unwrap();

    assert_eq!(first_ack, RespValue::command(&["REPLCONF", "ACK", "31"]));
    assert_eq!(second_ack, RespValue::command(&["REPLCONF", "ACK", "68"]));

    let mut client = replica.connect().await;
    assert_eq!(
        client.request(TestUtils::get_command("foo")).await,
        RespValue::bulk_string("bar")
    );
    assert_eq!(
        client.request(TestUtils::info_command("replication")).await,
        RespValue::bulk_string("role:slave")
    );

    replica.stop().await;
}

#[tokio::test]
async fn test_replica_startup_fails_on_unexpected_handshake_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let master_address = listener.local_addr().unwrap();

    let fake_master = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = RespReader::new(reader);

        assert_eq!(
            TestUtils::read_value(&mut reader).await,
            RespValue::command(&["PING"])
        );
        writer.write_all(b"+NOPE\r\n").await.unwrap();

        let (mut raw, buffered) = reader.into_inner();
        let mut rest = buffered.to_vec();
        raw.read_to_end(&mut rest).await.unwrap();
        rest
    });

    let result = RedisServer::start(&ServerConfig {
        port: 0,
        replica_of: Some((master_address.ip().to_string(), master_address.port())),
    })
    .await;

    assert!(result.is_err());
    assert!(fake_master.await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replica_startup_fails_without_master() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let master_address = listener.local_addr().unwrap();
    drop(listener);

    assert!(TestServer::start_replica_of(master_address).await.is_err());
}

#[tokio::test]
async fn test_master_and_replica_end_to_end() {
    let master = TestServer::start_master().await;
    let replica = TestServer::start_replica_of(master.address).await.unwrap();

    let master_replication = master.replication.clone();
    TestUtils::eventually(|| master_replication.replicas().len() == 1).await;

    let mut master_client = master.connect().await;
    assert_eq!(
        master_client.request(TestUtils::set_command("foo", "bar")).await,
        RespValue::simple_string("OK")
    );

    let replica_store = replica.store.clone();
    TestUtils::eventually(|| replica_store.get(b"foo") == Some(Bytes::from("bar"))).await;

    let replica_replication = replica.replication.clone();
    TestUtils::eventually(|| replica_replication.offset() == 31).await;
    assert_eq!(master.replication.offset(), 31);

    let mut replica_client = replica.connect().await;
    assert_eq!(
        replica_client.request(TestUtils::get_command("foo")).await,
        RespValue::bulk_string("bar")
    );

    replica.stop().await;
    master.stop().await;
}

#[tokio::test]
async fn test_propagation_over_tcp_is_byte_exact() {
    let master = TestServer::start_master().await;
    let stream = TcpStream::connect(master.address).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = RespReader::new(reader);

    writer
        .write_all(&TestUtils::psync_command().encode())
        .await
        .unwrap();
    let status = TestUtils::read_value(&mut reader).await;
    assert!(matches!(status, RespValue::SimpleString(line) if line.starts_with("FULLRESYNC ")));
    reader.read_rdb_payload().await.unwrap();

    let master_replication = master.replication.clone();
    TestUtils::eventually(|| master_replication.replicas().len() == 1).await;

    let mut client = master.connect().await;
    client.request(TestUtils::set_command("foo", "bar")).await;

    let (mut raw, buffered) = reader.into_inner();
    let mut received = buffered.to_vec();
    received.extend(read_exactly(&mut raw, SET_FOO_BAR.len() - received.len()).await);
    assert_eq!(received, SET_FOO_BAR);

    master.stop().await;
}
