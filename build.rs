//! Build script for cogen-rs.
//!
//! Detects the target platform to determine which I/O backend
//! `io::default_backend()` should select, via the `io_backend` cfg flag.
//!
//! ## Platform-specific I/O backend selection
//!
//! - **Windows**: IOCP
//! - **macOS/iOS**: kqueue
//! - **Linux**: epoll
//! - **Other Unix**: poll
//!
//! `RUST_MINISS_IO_BACKEND` overrides the autodetected choice, for testing a
//! specific backend regardless of platform defaults.

fn main() {
    // Emit check-cfg hints so `cfg(io_backend = "...")` is accepted by the compiler
    println!(
        "cargo:rustc-check-cfg=cfg(io_backend, values(\"epoll\", \"kqueue\", \"poll\", \"select\", \"iocp\"))"
    );

    if cfg!(target_os = "windows") {
        eprintln!("Enabling IOCP backend (Windows)");
        println!("cargo:rustc-cfg=io_backend=\"iocp\"");
    } else if cfg!(any(target_os = "macos", target_os = "ios")) {
        eprintln!("Enabling kqueue backend (macOS/iOS)");
        println!("cargo:rustc-cfg=io_backend=\"kqueue\"");
    } else if cfg!(target_os = "linux") {
        eprintln!("Enabling epoll backend (Linux)");
        println!("cargo:rustc-cfg=io_backend=\"epoll\"");
    } else if cfg!(unix) {
        // Any other Unix: prefer poll over select, both are always present.
        eprintln!("No epoll/kqueue on this platform: falling back to poll.");
        println!("cargo:rustc-cfg=io_backend=\"poll\"");
    } else {
        eprintln!("Unrecognized platform, using dummy backend");
    }

    // Escape hatch: RUST_MINISS_IO_BACKEND overrides the autodetected choice,
    // for testing a specific backend regardless of platform defaults.
    if let Ok(forced) = std::env::var("RUST_MINISS_IO_BACKEND") {
        eprintln!("RUST_MINISS_IO_BACKEND override: {forced}");
        println!("cargo:rustc-cfg=io_backend=\"{forced}\"");
    }
}
