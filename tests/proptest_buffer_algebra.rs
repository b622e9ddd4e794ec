//! Property-based tests for the `Socket<T>` buffer algebra (`read_all`):
//! across any split of a byte stream into writes, `read_all(n)` must yield
//! exactly the first `n` bytes, and the remainder must survive intact for
//! whatever reads it.

use cogen_rs::net::{AsyncTcpListener, AsyncTcpStream};
use cogen_rs::{spawn, Runtime};
use proptest::prelude::*;
use std::net::SocketAddr;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn read_all_yields_exactly_n_bytes_regardless_of_chunking(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..16), 1..8),
    ) {
        let total: Vec<u8> = chunks.iter().flatten().copied().collect();
        prop_assume!(total.len() >= 4);
        let n = total.len() / 2;
        let expected_head = total[..n].to_vec();
        let expected_tail = total[n..].to_vec();

        let runtime = Runtime::new();
        runtime.block_on(async move {
            let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
            let listener = AsyncTcpListener::bind(addr).expect("bind listener");
            let listener_addr = listener.local_addr().expect("listener addr");

            let expected_tail_len = expected_tail.len();
            let server = spawn(async move {
                let (stream, _) = listener.accept().await.expect("accept");
                let head = stream.read_all(n).await.expect("read_all");
                assert_eq!(&head[..], &expected_head[..]);
                if expected_tail_len > 0 {
                    let tail = stream.read_all(expected_tail_len).await.expect("read_all tail");
                    assert_eq!(&tail[..], &expected_tail[..]);
                }
            });

            let client = AsyncTcpStream::connect(listener_addr).await.expect("connect");
            for chunk in &chunks {
                if !chunk.is_empty() {
                    client.write_all(chunk).await.expect("write chunk");
                }
            }

            server.await.expect("server task");
        });
    }
}
