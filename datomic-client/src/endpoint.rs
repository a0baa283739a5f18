//! Endpoint parsing.

use datomic_protocol::Anomaly;

/// A parsed `host[:port]` endpoint. The scheme is always https.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: &'static str,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Value for the `host` header; the port rides along when it is not
    /// the https default.
    pub fn host_header(&self) -> String {
        if self.port == 443 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host` or `host:port`. Anything else is an incorrect anomaly.
pub fn parse_endpoint(s: &str) -> Result<Endpoint, Anomaly> {
    let malformed = || Anomaly::incorrect(format!("Invalid endpoint: {s}"));
    let (host, port) = match s.split_once(':') {
        None => (s, 443),
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| malformed())?),
    };
    if host.is_empty() || host.contains([':', '/', ' ']) {
        return Err(malformed());
    }
    Ok(Endpoint {
        scheme: "https",
        host: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_only_defaults_to_443() {
        let ep = parse_endpoint("example.com").unwrap();
        assert_eq!(ep.scheme, "https");
        assert_eq!(ep.host, "example.com");
        assert_eq!(ep.port, 443);
        assert_eq!(ep.host_header(), "example.com");
    }

    #[test]
    fn test_host_and_port() {
        let ep = parse_endpoint("example.com:8080").unwrap();
        assert_eq!(ep.port, 8080);
        assert_eq!(ep.host_header(), "example.com:8080");
    }

    #[test]
    fn test_malformed_endpoints() {
        for bad in ["::bad::", "host:port", "host:", ":443", "", "a b:1"] {
            let err = parse_endpoint(bad).unwrap_err();
            assert_eq!(err.category, datomic_protocol::Category::Incorrect, "{bad}");
        }
    }
}
