//! A minimal asynchronous TCP echo/HTTP-response server.

use cogen_rs::net::{AsyncTcpListener, AsyncTcpStream};
use cogen_rs::{spawn, Runtime};
use std::net::SocketAddr;

async fn handle_client(stream: AsyncTcpStream) {
    if let Err(e) = stream.read(4096).await {
        eprintln!("failed to read from stream: {}", e);
        return;
    }

    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\nHello world!";
    if let Err(e) = stream.write_all(response).await {
        eprintln!("failed to write to stream: {}", e);
    }
}

async fn run_server() {
    let addr: SocketAddr = "0.0.0.0:8080".parse().expect("valid address");
    let listener = AsyncTcpListener::bind(addr).expect("failed to bind listener");
    println!("HTTP echo server listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, client_addr)) => {
                match client_addr {
                    Some(addr) => println!("accepted connection from {}", addr),
                    None => println!("accepted connection from <unknown>"),
                }
                spawn(handle_client(stream));
            }
            Err(e) => eprintln!("failed to accept connection: {}", e),
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    Runtime::new().block_on(run_server());
}
