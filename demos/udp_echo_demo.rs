//! Comprehensive async UDP demo showing various UDP operations.

use cogen_rs::{net::AsyncUdpSocket, Runtime};
use std::net::SocketAddr;

fn main() {
    tracing_subscriber::fmt::init();

    let runtime = Runtime::new();

    runtime.block_on(async move {
        println!("=== Async UDP Demo ===");

        println!("1. Basic UDP send/receive:");
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let socket = match AsyncUdpSocket::bind(addr) {
            Ok(sock) => sock,
            Err(e) => {
                eprintln!("   failed to bind socket: {}", e);
                return;
            }
        };

        match socket.local_addr() {
            Ok(local_addr) => println!("   bound to local address: {}", local_addr),
            Err(e) => {
                eprintln!("   failed to get local address: {}", e);
                return;
            }
        }

        let test_data = b"Hello, async UDP!";
        let bytes_sent = match socket.send_to(test_data, addr).await {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("   failed to send data: {}", e);
                return;
            }
        };
        println!(
            "   sent {} bytes: {:?}",
            bytes_sent,
            String::from_utf8_lossy(test_data)
        );

        let mut buf = [0u8; 1024];
        let (bytes_read, sender_addr) = match socket.recv_from(&mut buf).await {
            Ok(result) => result,
            Err(e) => {
                eprintln!("   failed to receive data: {}", e);
                return;
            }
        };
        println!(
            "   received {} bytes from {}: {:?}",
            bytes_read,
            sender_addr,
            String::from_utf8_lossy(&buf[..bytes_read])
        );

        println!("2. Multiple UDP sends:");
        for i in 1..=3 {
            let message = format!("Message {}", i);
            let data = message.as_bytes();
            match socket.send_to(data, addr).await {
                Ok(bytes) => println!("   sent message {}: {} bytes", i, bytes),
                Err(e) => {
                    eprintln!("   failed to send message {}: {}", i, e);
                    continue;
                }
            };

            match socket.recv_from(&mut buf).await {
                Ok((n, _)) => println!(
                    "   received response: {:?}",
                    String::from_utf8_lossy(&buf[..n])
                ),
                Err(e) => eprintln!("   failed to receive response for message {}: {}", i, e),
            }
        }

        println!("UDP demo completed successfully!");
    });
}
