use std::time::Duration;

use redis_replication::{input::CommandReadError, resp::RespValue};
use tokio::time::timeout;

use crate::test_utils::{TestEnv, TestUtils, REPLY_TIMEOUT};

#[tokio::test]
async fn test_pipelined_commands_are_answered_in_order() {
    let env = TestEnv::new_master_server();
    let mut client = env.connect("127.0.0.1:50001");

    let mut pipeline = Vec::new();
    pipeline.extend_from_slice(&TestUtils::set_command("foo", "bar").encode());
    pipeline.extend_from_slice(&TestUtils::get_command("foo").encode());
    pipeline.extend_from_slice(&TestUtils::echo_command("hey").encode());
    client.send_raw(&pipeline).await;

    assert_eq!(client.read_value().await, RespValue::simple_string("OK"));
    assert_eq!(client.read_value().await, RespValue::bulk_string("bar"));
    assert_eq!(client.read_value().await, RespValue::bulk_string("hey"));
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let env = TestEnv::new_master_server();
    let mut client = env.connect("127.0.0.1:50002");
    let command = TestUtils::echo_command("split").encode();

    client.send_raw(&command[..7]).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(&command[7..]).await;

    assert_eq!(client.read_value().await, RespValue::bulk_string("split"));
}

#[tokio::test]
async fn test_command_error_keeps_connection_open() {
    let env = TestEnv::new_master_server();
    let mut client = env.connect("127.0.0.1:50003");

    assert_eq!(
        client.request(RespValue::command(&["FLUSHALL"])).await,
        RespValue::Error("ERR unknown command 'FLUSHALL'".to_string())
    );
    assert_eq!(
        client.request(RespValue::command(&["GET"])).await,
        RespValue::Error("ERR wrong number of arguments for 'get' command".to_string())
    );
    assert_eq!(
        client.request(TestUtils::ping_command()).await,
        RespValue::simple_string("PONG")
    );
}

#[tokio::test]
async fn test_protocol_error_closes_connection() {
    let env = TestEnv::new_master_server();
    let mut client = env.connect("127.0.0.1:50004");

    client.send_raw(b"?what\r\n").await;

    assert_eq!(
        client.read_value().await,
        RespValue::Error("ERR Protocol error: unknown RESP type '?'".to_string())
    );

    timeout(REPLY_TIMEOUT, &mut client.task)
        .await
        .expect("connection did not close")
        .unwrap();
    assert_eq!(
        client.reader.read_frame().await,
        Err(CommandReadError::ConnectionClosed)
    );
}

#[tokio::test]
async fn test_replica_connection_answers_reads_and_rejects_writes() {
    let env = TestEnv::new_replica_server();
    let mut client = env.connect("127.0.0.1:50005");

    assert_eq!(
        client.request(TestUtils::set_command("foo", "bar")).await,
        RespValue::Error("READONLY You can't write against a read only replica.".to_string())
    );
    assert_eq!(
        client.request(TestUtils::get_command("foo")).await,
        RespValue::null_bulk_string()
    );
    assert_eq!(
        client.request(TestUtils::info_command("replication")).await,
        RespValue::bulk_string("role:slave")
    );
}

#[tokio::test]
async fn test_shutdown_stops_connections() {
    let env = TestEnv::new_master_server();
    let mut client = env.connect("127.0.0.1:50006");

    assert_eq!(
        client.request(TestUtils::ping_command()).await,
        RespValue::simple_string("PONG")
    );

    env.shutdown();

    timeout(REPLY_TIMEOUT, &mut client.task)
        .await
        .expect("connection ignored shutdown")
        .unwrap();
}
