//! Parsers for `ipvsadm` listings.
//!
//! Both parsers are permissive: a line that does not have a recognised
//! shape, or whose numeric fields do not parse, is skipped.

/// Protocol column values that open a virtual-service row.
const PROTOCOLS: [&str; 3] = ["TCP", "UDP", "FWM"];

/// First fields of header lines.
const HEADERS: [&str; 3] = ["IP", "Prot", "RemoteAddress:Port"];

/// The five counters `--stats` prints per row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub connections: u64,
    pub in_packets: u64,
    pub out_packets: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
}

impl Counters {
    fn parse(fields: &[&str]) -> Option<Self> {
        let [conns, in_pkts, out_pkts, in_bytes, out_bytes, ..] = fields else {
            return None;
        };
        Some(Self {
            connections: conns.parse().ok()?,
            in_packets: in_pkts.parse().ok()?,
            out_packets: out_pkts.parse().ok()?,
            in_bytes: in_bytes.parse().ok()?,
            out_bytes: out_bytes.parse().ok()?,
        })
    }
}

/// Per-virtual-service statistics, with the real-server rows under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStats {
    /// `address:port` as printed.
    pub service: String,
    pub counters: Counters,
    /// (real server `address:port`, counters).
    pub backends: Vec<(String, Counters)>,
}

/// Parse `ipvsadm -L -n --stats --exact`.
///
/// A service row is `<addr:port> c ip op ib ob`, optionally preceded by
/// the protocol column. An arrow row `-> <addr:port> c ip op ib ob`
/// belongs to the service block above it. Any protocol row ends the
/// current block; when it cannot be read (an `FWM <mark>` row, bad
/// counters) its arrow rows are dropped rather than credited to the
/// previous service.
pub fn parse_stats(output: &str) -> Vec<ServiceStats> {
    let mut services: Vec<ServiceStats> = Vec::new();
    let mut state = ScanState::SeekingService;

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["->", backend, rest @ ..] if backend.contains(':') => {
                let ScanState::InService(_) = &state else {
                    continue;
                };
                let (Some(current), Some(counters)) = (services.last_mut(), Counters::parse(rest))
                else {
                    continue;
                };
                current.backends.push((backend.to_string(), counters));
            }
            [proto, rest @ ..] if PROTOCOLS.contains(proto) => {
                state = open_block(&mut services, rest);
            }
            [service, ..] if service.contains(':') => {
                state = open_block(&mut services, &fields);
            }
            _ => {}
        }
    }

    services
}

/// Start a block from `<addr:port> c ip op ib ob`.
fn open_block(services: &mut Vec<ServiceStats>, fields: &[&str]) -> ScanState {
    let [service, rest @ ..] = fields else {
        return ScanState::SeekingService;
    };
    if !service.contains(':') {
        return ScanState::SeekingService;
    }
    let Some(counters) = Counters::parse(rest) else {
        return ScanState::SeekingService;
    };
    services.push(ServiceStats {
        service: service.to_string(),
        counters,
        backends: Vec::new(),
    });
    ScanState::InService(service.to_string())
}

/// One real-server row of `ipvsadm -Ln`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRow {
    /// The virtual service block the row appeared in.
    pub service: String,
    pub backend: String,
    pub weight: u64,
    pub active: u64,
    pub inactive: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    SeekingService,
    InService(String),
}

/// Line-at-a-time scanner for `ipvsadm -Ln`.
///
/// Arrow rows are attributed to the most recent protocol row; arrow rows
/// before any protocol row are ignored.
#[derive(Debug, Clone)]
pub struct ConnectionScanner {
    state: ScanState,
}

impl Default for ConnectionScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::SeekingService,
        }
    }

    /// The service block currently open, if any.
    pub fn current_service(&self) -> Option<&str> {
        match &self.state {
            ScanState::SeekingService => None,
            ScanState::InService(service) => Some(service),
        }
    }

    /// Consume one line; returns a row when the line is a real server.
    pub fn feed(&mut self, line: &str) -> Option<BackendRow> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let first = *fields.first()?;

        if HEADERS.contains(&first) || fields.get(1) == Some(&"RemoteAddress:Port") {
            return None;
        }

        if PROTOCOLS.contains(&first) {
            let service = fields.get(1)?;
            self.state = ScanState::InService(service.to_string());
            return None;
        }

        let ScanState::InService(service) = &self.state else {
            return None;
        };
        match fields.as_slice() {
            ["->", backend, _forward, weight, active, inactive, ..] => Some(BackendRow {
                service: service.clone(),
                backend: backend.to_string(),
                weight: weight.parse().ok()?,
                active: active.parse().ok()?,
                inactive: inactive.parse().ok()?,
            }),
            _ => None,
        }
    }
}

/// Parse `ipvsadm -Ln` into real-server rows, in listing order.
pub fn parse_connections(output: &str) -> Vec<BackendRow> {
    let mut scanner = ConnectionScanner::new();
    output.lines().filter_map(|line| scanner.feed(line)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_bare_service_line() {
        let stats = parse_stats("10.0.0.1:80 42 100 200 5000 9000\n");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].service, "10.0.0.1:80");
        assert_eq!(
            stats[0].counters,
            Counters {
                connections: 42,
                in_packets: 100,
                out_packets: 200,
                in_bytes: 5000,
                out_bytes: 9000,
            }
        );
    }

    #[test]
    fn stats_full_listing_with_backends() {
        let output = "\
IP Virtual Server version 1.2.1 (size=4096)
Prot LocalAddress:Port               Conns   InPkts  OutPkts  InBytes OutBytes
  -> RemoteAddress:Port
TCP  10.0.0.1:80                        42      100      200     5000     9000
  -> 10.0.0.2:8080                      30       70      140     3500     6300
  -> 10.0.0.3:8080                      12       30       60     1500     2700
UDP  10.0.0.5:53                         7        7        7      420      980
";
        let stats = parse_stats(output);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].service, "10.0.0.1:80");
        assert_eq!(stats[0].counters.connections, 42);
        assert_eq!(stats[0].backends.len(), 2);
        assert_eq!(stats[0].backends[1].0, "10.0.0.3:8080");
        assert_eq!(stats[0].backends[1].1.out_bytes, 2700);
        assert_eq!(stats[1].service, "10.0.0.5:53");
        assert!(stats[1].backends.is_empty());
    }

    #[test]
    fn stats_skips_malformed_lines() {
        let output = "\
10.0.0.1:80 42 100 200
10.0.0.1:81 a b c d e
  -> 10.0.0.2:8080 1 2 3 4 5
garbage
";
        assert!(parse_stats(output).is_empty());
    }

    #[test]
    fn stats_unreadable_service_row_closes_block() {
        let output = "\
TCP  10.0.0.1:80                        42      100      200     5000     9000
  -> 10.0.0.2:8080                      30       70      140     3500     6300
FWM  7                                   5        5        5      300      300
  -> 10.0.0.9:80                         5        5        5      300      300
UDP  10.0.0.5:53                         x        7        7      420      980
  -> 10.0.0.6:53                         7        7        7      420      980
TCP  10.0.0.7:443                        1        2        3        4        5
  -> 10.0.0.8:443                        1        2        3        4        5
";
        let stats = parse_stats(output);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].service, "10.0.0.1:80");
        assert_eq!(stats[0].backends.len(), 1);
        assert_eq!(stats[0].backends[0].0, "10.0.0.2:8080");
        assert_eq!(stats[1].service, "10.0.0.7:443");
        assert_eq!(stats[1].backends, vec![(
            "10.0.0.8:443".to_string(),
            Counters {
                connections: 1,
                in_packets: 2,
                out_packets: 3,
                in_bytes: 4,
                out_bytes: 5,
            }
        )]);
    }

    #[test]
    fn connection_block() {
        let rows = parse_connections("TCP 10.0.0.1:80 rr\n  -> 10.0.0.2:8080 Masq 5 3 1\n");
        assert_eq!(
            rows,
            vec![BackendRow {
                service: "10.0.0.1:80".to_string(),
                backend: "10.0.0.2:8080".to_string(),
                weight: 5,
                active: 3,
                inactive: 1,
            }]
        );
    }

    #[test]
    fn connection_listing_with_headers_and_blocks() {
        let output = "\
IP Virtual Server version 1.2.1 (size=4096)
Prot LocalAddress:Port Scheduler Flags
  -> RemoteAddress:Port           Forward Weight ActiveConn InActConn
TCP  10.0.0.1:80 rr
  -> 10.0.0.2:8080                Masq    5      3          1
  -> 10.0.0.3:8080                Masq    1      0          4
UDP  10.0.0.5:53 rr
  -> 10.0.0.6:53                  Masq    2      0          0
";
        let rows = parse_connections(output);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].service, "10.0.0.1:80");
        assert_eq!(rows[1].inactive, 4);
        assert_eq!(rows[2].service, "10.0.0.5:53");
        assert_eq!(rows[2].weight, 2);
    }

    #[test]
    fn scanner_state_line_by_line() {
        let mut scanner = ConnectionScanner::new();
        assert_eq!(scanner.current_service(), None);

        // Arrow rows before any service are ignored.
        assert_eq!(scanner.feed("  -> 10.0.0.9:80 Masq 1 0 0"), None);
        assert_eq!(scanner.feed("Prot LocalAddress:Port Scheduler Flags"), None);
        assert_eq!(scanner.current_service(), None);

        assert_eq!(scanner.feed("TCP  10.0.0.1:80 rr"), None);
        assert_eq!(scanner.current_service(), Some("10.0.0.1:80"));

        assert_eq!(scanner.feed("  -> RemoteAddress:Port Forward Weight ActiveConn InActConn"), None);
        assert_eq!(scanner.feed(""), None);
        assert_eq!(scanner.current_service(), Some("10.0.0.1:80"));

        let row = scanner.feed("  -> 10.0.0.2:8080 Masq 5 3 1").unwrap();
        assert_eq!(row.backend, "10.0.0.2:8080");

        assert_eq!(scanner.feed("FWM  7 wlc"), None);
        assert_eq!(scanner.current_service(), Some("7"));
    }

    #[test]
    fn connection_row_with_bad_numbers_is_skipped() {
        let rows = parse_connections("TCP 10.0.0.1:80 rr\n  -> 10.0.0.2:8080 Masq x 3 1\n");
        assert!(rows.is_empty());
    }
}
