//! Tests for async TCP functionality (accept/connect/read/write_all).

use cogen_rs::net::{AsyncTcpListener, AsyncTcpStream};
use cogen_rs::{spawn, Runtime};
use std::net::SocketAddr;

#[test]
fn connect_accept_and_echo_roundtrip() {
    let runtime = Runtime::new();

    runtime.block_on(async {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = AsyncTcpListener::bind(addr).expect("bind listener");
        let listener_addr = listener.local_addr().expect("listener local addr");

        let server = spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let msg = stream.read(64).await.expect("server read");
            stream.write_all(&msg).await.expect("server echo");
        });

        let client = AsyncTcpStream::connect(listener_addr)
            .await
            .expect("client connect");
        client.write_all(b"ping").await.expect("client write");
        let echoed = client.read(64).await.expect("client read");

        assert_eq!(&echoed[..], b"ping");
        server.await.expect("server task");
    });
}

#[test]
fn read_all_accumulates_across_several_writes() {
    let runtime = Runtime::new();

    runtime.block_on(async {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = AsyncTcpListener::bind(addr).expect("bind listener");
        let listener_addr = listener.local_addr().expect("listener local addr");

        let server = spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let payload = stream.read_all(10).await.expect("server read_all");
            assert_eq!(&payload[..], b"0123456789");
        });

        let client = AsyncTcpStream::connect(listener_addr)
            .await
            .expect("client connect");
        client.write_all(b"01234").await.expect("first chunk");
        client.write_all(b"56789").await.expect("second chunk");

        server.await.expect("server task");
    });
}

#[test]
fn read_line_finds_newline_across_writes() {
    let runtime = Runtime::new();

    runtime.block_on(async {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = AsyncTcpListener::bind(addr).expect("bind listener");
        let listener_addr = listener.local_addr().expect("listener local addr");

        let server = spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let line = stream.read_line(64).await.expect("server read_line");
            assert_eq!(&line[..], b"hello\n");
            let rest = stream.read(64).await.expect("server read rest");
            assert_eq!(&rest[..], b"world");
        });

        let client = AsyncTcpStream::connect(listener_addr)
            .await
            .expect("client connect");
        client.write_all(b"hel").await.expect("chunk 1");
        client.write_all(b"lo\nworld").await.expect("chunk 2");

        server.await.expect("server task");
    });
}
