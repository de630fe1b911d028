use std::net::UdpSocket;

use get_if_addrs::get_if_addrs;

/// Guesses the local address a device on the LAN can reach us under.
///
/// Asks the OS which interface it would route Internet traffic through by
/// connecting a UDP socket towards a public address. UDP is connectionless,
/// so no packet is sent; the socket simply gets bound to the outgoing
/// interface. Falls back to the first non-loopback IPv4 interface, then to
/// loopback.
pub fn guess_local_ip() -> String {
    if let Ok(socket) = UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(local_addr) = socket.local_addr() {
                return local_addr.ip().to_string();
            }
        }
    }

    first_lan_ip().unwrap_or_else(|| "127.0.0.1".to_string())
}

fn first_lan_ip() -> Option<String> {
    let interfaces = get_if_addrs().ok()?;
    interfaces
        .iter()
        .map(|iface| iface.ip())
        .find(|ip| ip.is_ipv4() && !ip.is_loopback())
        .map(|ip| ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn guessed_ip_is_valid_ipv4() {
        let ip = guess_local_ip();
        let parsed: IpAddr = ip.parse().expect("should be a parsable address");
        assert!(parsed.is_ipv4());
    }
}
