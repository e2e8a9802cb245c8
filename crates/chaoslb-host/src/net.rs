//! Local socket checks.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};

/// Verify nothing is listening on `port` by binding it and releasing it.
pub fn check_port_available(port: u16) -> io::Result<()> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    drop(listener);
    Ok(())
}
