//! Startup banner

use super::config::is_all_interfaces;
use super::constants::APP_NAME;

/// Print a small startup banner: listening address, storage backend, auth status.
pub fn print_banner(host: &str, port: u16, storage_backend: &str, auth_enabled: bool) {
    let display_host = if is_all_interfaces(host) { "localhost" } else { host };

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();

    const W: usize = 12;
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m http://{}:{}",
        "Listening:", display_host, port
    );
    println!("  \x1b[90m➜  {:<W$} {}\x1b[0m", "Storage:", storage_backend);
    println!(
        "  \x1b[90m➜  {:<W$} {}\x1b[0m",
        "Auth:",
        if auth_enabled { "enabled" } else { "disabled" }
    );
    println!();
}
