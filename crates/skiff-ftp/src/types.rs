// ── Types ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_port() -> u16 {
    21
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_data_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FtpSecurityMode {
    /// Plain FTP.
    #[default]
    None,
    /// Explicit FTPS: plain connect, then `AUTH TLS` upgrade (RFC 4217).
    Explicit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub security: FtpSecurityMode,
    /// Self-signed server certificates are accepted when set.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_data_timeout")]
    pub data_timeout_secs: u64,
}

/// A complete FTP reply: 3-digit code plus one or more lines.
#[derive(Debug, Clone)]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// 2xx — completed.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 1xx — transfer about to start.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 3xx — more input expected (e.g. 331 after USER, 350 after REST).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

/// What the server advertised in its `FEAT` reply.
#[derive(Debug, Clone, Default)]
pub struct ServerFeatures {
    pub mlsd: bool,
    pub size: bool,
    pub mdtm: bool,
    pub rest_stream: bool,
    pub utf8: bool,
    pub raw: Vec<String>,
}

impl ServerFeatures {
    pub fn from_feat_lines(lines: &[String]) -> Self {
        let raw: Vec<String> = lines
            .iter()
            .skip(1) // "211-Features:"
            .filter(|l| !l.starts_with("211"))
            .map(|l| l.trim().to_uppercase())
            .collect();
        let has = |feat: &str| raw.iter().any(|l| l.starts_with(feat));
        Self {
            mlsd: has("MLSD"),
            size: has("SIZE"),
            mdtm: has("MDTM"),
            rest_stream: has("REST STREAM"),
            utf8: has("UTF8"),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let json = r#"{"host":"ftp.example.com","username":"anonymous"}"#;
        let cfg: FtpConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.port, 21);
        assert_eq!(cfg.security, FtpSecurityMode::None);
        assert!(cfg.accept_invalid_certs);
    }

    #[test]
    fn response_classes() {
        let r = FtpResponse { code: 150, lines: vec!["150 Opening".into()] };
        assert!(r.is_preliminary());
        let r = FtpResponse { code: 226, lines: vec!["226 Done".into()] };
        assert!(r.is_success());
        let r = FtpResponse { code: 350, lines: vec!["350 Restarting".into()] };
        assert!(r.is_intermediate());
    }

    #[test]
    fn feat_parsing() {
        let lines = vec![
            "211-Features:".to_string(),
            " MLSD".to_string(),
            " SIZE".to_string(),
            " REST STREAM".to_string(),
            " UTF8".to_string(),
            "211 End".to_string(),
        ];
        let f = ServerFeatures::from_feat_lines(&lines);
        assert!(f.mlsd && f.size && f.rest_stream && f.utf8);
        assert!(!f.mdtm);
    }
}
