//! Command-semantics tests through a real Redis client library against a
//! server running on an ephemeral port.

use std::net::SocketAddr;

use redis::aio::MultiplexedConnection;
use redis::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use rudis::config::Config;
use rudis::server::serve;

async fn spawn_server() -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind server");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        serve(listener, Config::default(), async move {
            let _ = rx.await;
        })
        .await
    });
    (addr, tx)
}

async fn connect() -> (MultiplexedConnection, oneshot::Sender<()>) {
    let (addr, shutdown) = spawn_server().await;
    let client = redis::Client::open(format!("redis://{addr}/")).expect("client");
    let conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("connect");
    (conn, shutdown)
}

#[tokio::test]
async fn set_get_and_missing_keys() {
    let (mut conn, _shutdown) = connect().await;

    let reply: String = redis::cmd("SET")
        .arg("greeting")
        .arg("hello")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(reply, "OK");

    let value: Option<String> = redis::cmd("GET")
        .arg("greeting")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("hello"));

    let value: Value = redis::cmd("GET")
        .arg("missing")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(value, Value::Nil);
}

#[tokio::test]
async fn set_nx_and_xx_options() {
    let (mut conn, _shutdown) = connect().await;

    let first: Value = redis::cmd("SET")
        .arg("k")
        .arg("v1")
        .arg("NX")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(first, Value::Okay);

    let second: Value = redis::cmd("SET")
        .arg("k")
        .arg("v2")
        .arg("NX")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(second, Value::Nil);

    let update: Value = redis::cmd("SET")
        .arg("k")
        .arg("v3")
        .arg("XX")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(update, Value::Okay);

    let value: String = redis::cmd("GET").arg("k").query_async(&mut conn).await.unwrap();
    assert_eq!(value, "v3");

    let err = redis::cmd("SET")
        .arg("k")
        .arg("v")
        .arg("NX")
        .arg("XX")
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("syntax error"));
}

#[tokio::test]
async fn setnx_and_getset() {
    let (mut conn, _shutdown) = connect().await;

    let inserted: i64 = redis::cmd("SETNX")
        .arg("k")
        .arg("first")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let inserted: i64 = redis::cmd("SETNX")
        .arg("k")
        .arg("second")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(inserted, 0);

    let old: Option<String> = redis::cmd("GETSET")
        .arg("k")
        .arg("third")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(old.as_deref(), Some("first"));

    let old: Value = redis::cmd("GETSET")
        .arg("fresh")
        .arg("v")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(old, Value::Nil);
}

#[tokio::test]
async fn counters() {
    let (mut conn, _shutdown) = connect().await;

    let n: i64 = redis::cmd("INCR").arg("n").query_async(&mut conn).await.unwrap();
    assert_eq!(n, 1);
    let n: i64 = redis::cmd("INCRBY")
        .arg("n")
        .arg(10)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(n, 11);
    let n: i64 = redis::cmd("DECR").arg("n").query_async(&mut conn).await.unwrap();
    assert_eq!(n, 10);
    let n: i64 = redis::cmd("DECRBY")
        .arg("n")
        .arg(4)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(n, 6);

    redis::cmd("SET")
        .arg("text")
        .arg("not a number")
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();
    let err = redis::cmd("INCR")
        .arg("text")
        .query_async::<_, i64>(&mut conn)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not an integer"));

    redis::cmd("SET")
        .arg("ceiling")
        .arg("9223372036854775807")
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();
    let err = redis::cmd("INCR")
        .arg("ceiling")
        .query_async::<_, i64>(&mut conn)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not an integer"));
}

#[tokio::test]
async fn mset_mget_and_msetnx() {
    let (mut conn, _shutdown) = connect().await;

    let reply: String = redis::cmd("MSET")
        .arg("a")
        .arg("1")
        .arg("b")
        .arg("2")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(reply, "OK");

    let values: Vec<Option<String>> = redis::cmd("MGET")
        .arg("a")
        .arg("missing")
        .arg("b")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(
        values,
        vec![Some("1".to_string()), None, Some("2".to_string())]
    );

    let written: i64 = redis::cmd("MSETNX")
        .arg("b")
        .arg("9")
        .arg("c")
        .arg("3")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(written, 0);

    // The colliding batch must not have written the fresh key either.
    let value: Value = redis::cmd("GET").arg("c").query_async(&mut conn).await.unwrap();
    assert_eq!(value, Value::Nil);
}

#[tokio::test]
async fn append_and_strlen() {
    let (mut conn, _shutdown) = connect().await;

    let len: i64 = redis::cmd("APPEND")
        .arg("k")
        .arg("hello")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(len, 5);

    let len: i64 = redis::cmd("APPEND")
        .arg("k")
        .arg(" world")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(len, 11);

    let len: i64 = redis::cmd("STRLEN").arg("k").query_async(&mut conn).await.unwrap();
    assert_eq!(len, 11);

    let len: i64 = redis::cmd("STRLEN")
        .arg("missing")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(len, 0);
}

#[tokio::test]
async fn ranges() {
    let (mut conn, _shutdown) = connect().await;

    redis::cmd("SET")
        .arg("k")
        .arg("Hello World")
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();

    let len: i64 = redis::cmd("SETRANGE")
        .arg("k")
        .arg(6)
        .arg("Redis")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(len, 11);

    let range: String = redis::cmd("GETRANGE")
        .arg("k")
        .arg(6)
        .arg(-1)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(range, "Redis");

    let whole: String = redis::cmd("GETRANGE")
        .arg("k")
        .arg(0)
        .arg(-1)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(whole, "Hello Redis");
}

#[tokio::test]
async fn del_and_exists() {
    let (mut conn, _shutdown) = connect().await;

    redis::cmd("MSET")
        .arg("a")
        .arg("1")
        .arg("b")
        .arg("2")
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();

    let present: i64 = redis::cmd("EXISTS")
        .arg("a")
        .arg("b")
        .arg("missing")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(present, 2);

    let removed: i64 = redis::cmd("DEL")
        .arg("a")
        .arg("b")
        .arg("missing")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let present: i64 = redis::cmd("EXISTS").arg("a").query_async(&mut conn).await.unwrap();
    assert_eq!(present, 0);
}

#[tokio::test]
async fn flushdb_clears_only_the_selected_database() {
    let (mut conn, _shutdown) = connect().await;

    redis::cmd("SET")
        .arg("keep")
        .arg("me")
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();

    redis::cmd("SELECT")
        .arg(1)
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();
    redis::cmd("SET")
        .arg("drop")
        .arg("me")
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();

    let reply: String = redis::cmd("FLUSHDB").query_async(&mut conn).await.unwrap();
    assert_eq!(reply, "OK");

    let dropped: Value = redis::cmd("GET")
        .arg("drop")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(dropped, Value::Nil);

    redis::cmd("SELECT")
        .arg(0)
        .query_async::<_, Value>(&mut conn)
        .await
        .unwrap();
    let kept: Option<String> = redis::cmd("GET")
        .arg("keep")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(kept.as_deref(), Some("me"));
}

#[tokio::test]
async fn connections_are_isolated_by_database_index() {
    let (addr, _shutdown) = spawn_server().await;
    let client = redis::Client::open(format!("redis://{addr}/")).expect("client");

    let mut first = client.get_multiplexed_async_connection().await.unwrap();
    let mut second = client.get_multiplexed_async_connection().await.unwrap();

    // The first connection moves to database 1; the second stays on 0.
    redis::cmd("SELECT")
        .arg(1)
        .query_async::<_, Value>(&mut first)
        .await
        .unwrap();
    redis::cmd("SET")
        .arg("k")
        .arg("in-db-1")
        .query_async::<_, Value>(&mut first)
        .await
        .unwrap();

    let from_second: Value = redis::cmd("GET")
        .arg("k")
        .query_async(&mut second)
        .await
        .unwrap();
    assert_eq!(from_second, Value::Nil);
}

#[tokio::test]
async fn ping() {
    let (mut conn, _shutdown) = connect().await;

    let reply: String = redis::cmd("PING").query_async(&mut conn).await.unwrap();
    assert_eq!(reply, "PONG");

    let reply: String = redis::cmd("PING")
        .arg("echo")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(reply, "echo");
}
