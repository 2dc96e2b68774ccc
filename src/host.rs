// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;

/// Identity of one managed host. Constructed once per target and reused
/// across invocations.
#[derive(Debug, Clone)]
pub struct HostSpec {
    pub hostname: String,
    pub port: u16,
    pub login: String,
    pub identity_file: Option<PathBuf>,
    pub is_local: bool,
}

impl HostSpec {
    pub fn new(hostname: String, port: u16, login: String) -> Self {
        let is_local = matches!(hostname.as_str(), "localhost" | "127.0.0.1" | "::1");
        Self {
            hostname,
            port,
            login,
            identity_file: None,
            is_local,
        }
    }

    /// Parse `[login@]hostname[:port]`. Falls back to the provided default
    /// login, then to `root`.
    pub fn parse(spec: &str, default_login: Option<&str>) -> Result<Self> {
        let (login_part, host_part) = match spec.find('@') {
            Some(at) => (Some(&spec[..at]), &spec[at + 1..]),
            None => (None, spec),
        };

        let (hostname, port) = match host_part.rfind(':') {
            Some(colon) => {
                let port = host_part[colon + 1..]
                    .parse::<u16>()
                    .with_context(|| format!("invalid port in host spec '{spec}'"))?;
                (&host_part[..colon], port)
            }
            None => (host_part, 22),
        };

        if hostname.is_empty() {
            anyhow::bail!("empty hostname in host spec '{spec}'");
        }

        let login = login_part
            .or(default_login)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "root".to_string());

        Ok(Self::new(hostname.to_string(), port, login))
    }

    pub fn with_identity_file(mut self, identity_file: Option<PathBuf>) -> Self {
        self.identity_file = identity_file;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.login, self.hostname, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hostname_only() {
        let host = HostSpec::parse("mds01.example.com", None).unwrap();
        assert_eq!(host.hostname, "mds01.example.com");
        assert_eq!(host.port, 22);
        assert_eq!(host.login, "root");
        assert!(!host.is_local);
    }

    #[test]
    fn parse_full_form() {
        let host = HostSpec::parse("admin@oss03:2222", None).unwrap();
        assert_eq!(host.login, "admin");
        assert_eq!(host.hostname, "oss03");
        assert_eq!(host.port, 2222);
    }

    #[test]
    fn parse_with_default_login() {
        let host = HostSpec::parse("oss03", Some("deploy")).unwrap();
        assert_eq!(host.login, "deploy");
    }

    #[test]
    fn parse_rejects_bad_port() {
        assert!(HostSpec::parse("oss03:notaport", None).is_err());
        assert!(HostSpec::parse("@:22", None).is_err());
    }

    #[test]
    fn localhost_is_detected() {
        assert!(HostSpec::parse("localhost", None).unwrap().is_local);
        assert!(HostSpec::parse("127.0.0.1", None).unwrap().is_local);
        assert!(!HostSpec::parse("10.0.0.4", None).unwrap().is_local);
    }

    #[test]
    fn display_round_trip() {
        let host = HostSpec::parse("admin@oss03:2222", None).unwrap();
        assert_eq!(host.to_string(), "admin@oss03:2222");
    }
}
