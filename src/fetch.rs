//! Resolve candidate image locators into raw bytes.
//!
//! Supported locators:
//! - `http://` and `https://` URLs
//! - `data:` URIs with a base64 payload
//! - `file://` URLs and bare paths (only when local files are enabled)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("invalid data URI: {0}")]
    DataUri(String),

    #[error("local file access is disabled")]
    LocalDisabled,

    #[error("unsupported locator scheme: {0}")]
    UnsupportedScheme(String),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can turn a locator into image bytes.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher backed by a shared ureq agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
    allow_local_files: bool,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build();

        Self {
            agent,
            max_bytes: config.max_bytes,
            allow_local_files: config.allow_local_files,
        }
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(FetchError::Status(code)),
            Err(e) => return Err(FetchError::Transport(e.to_string())),
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)?;

        self.check_size(bytes)
    }

    fn fetch_local(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        if !self.allow_local_files {
            return Err(FetchError::LocalDisabled);
        }

        if std::fs::metadata(path)?.len() > self.max_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        Ok(std::fs::read(path)?)
    }

    fn check_size(&self, bytes: Vec<u8>) -> Result<Vec<u8>, FetchError> {
        if bytes.len() as u64 > self.max_bytes {
            Err(FetchError::TooLarge {
                limit: self.max_bytes,
            })
        } else {
            Ok(bytes)
        }
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        let locator = locator.trim();
        let lower = locator.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            self.fetch_http(locator)
        } else if lower.starts_with("data:") {
            self.check_size(decode_data_uri(locator)?)
        } else if lower.starts_with("file://") {
            self.fetch_local(Path::new(&locator["file://".len()..]))
        } else if let Some((scheme, _)) = locator.split_once("://") {
            Err(FetchError::UnsupportedScheme(scheme.to_string()))
        } else {
            self.fetch_local(Path::new(locator))
        }
    }
}

/// Decode a `data:[<mediatype>];base64,<payload>` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, FetchError> {
    let rest = uri
        .get("data:".len()..)
        .ok_or_else(|| FetchError::DataUri("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::DataUri("missing ',' separator".to_string()))?;

    if !header.to_ascii_lowercase().ends_with(";base64") {
        return Err(FetchError::DataUri(
            "only base64 payloads are supported".to_string(),
        ));
    }

    BASE64
        .decode(payload.trim())
        .map_err(|e| FetchError::DataUri(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    /// Answer one HTTP request on a local port with `status` and `body`.
    fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            // The client may hang up early once it has seen enough
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        });

        format!("http://{}/image.jpg", addr)
    }

    fn fetcher(allow_local_files: bool, max_bytes: u64) -> HttpFetcher {
        HttpFetcher::new(&FetchConfig {
            allow_local_files,
            max_bytes,
            ..FetchConfig::default()
        })
    }

    #[test]
    fn test_decode_data_uri() {
        let bytes = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");

        assert!(matches!(
            decode_data_uri("data:text/plain,hello"),
            Err(FetchError::DataUri(_))
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64"),
            Err(FetchError::DataUri(_))
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(FetchError::DataUri(_))
        ));
    }

    #[test]
    fn test_data_uri_respects_size_limit() {
        let f = fetcher(false, 3);
        assert!(matches!(
            f.fetch("data:image/png;base64,aGVsbG8="),
            Err(FetchError::TooLarge { limit: 3 })
        ));
    }

    #[test]
    fn test_local_files_disabled_by_default() {
        let f = HttpFetcher::new(&FetchConfig::default());
        assert!(matches!(f.fetch("/etc/hostname"), Err(FetchError::LocalDisabled)));
        assert!(matches!(f.fetch("file:///etc/hostname"), Err(FetchError::LocalDisabled)));
    }

    #[test]
    fn test_local_file_fetch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"image-bytes").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let f = fetcher(true, 1024);
        assert_eq!(f.fetch(&path).unwrap(), b"image-bytes");
        assert_eq!(f.fetch(&format!("file://{}", path)).unwrap(), b"image-bytes");

        let small = fetcher(true, 4);
        assert!(matches!(small.fetch(&path), Err(FetchError::TooLarge { .. })));

        assert!(matches!(
            f.fetch("/definitely/not/here.jpg"),
            Err(FetchError::Io(_))
        ));
    }

    #[test]
    fn test_http_fetch() {
        let url = serve_once("200 OK", b"png-bytes".to_vec());
        assert_eq!(fetcher(false, 1024).fetch(&url).unwrap(), b"png-bytes");
    }

    #[test]
    fn test_http_error_status() {
        let url = serve_once("404 Not Found", Vec::new());
        assert!(matches!(fetcher(false, 1024).fetch(&url), Err(FetchError::Status(404))));
    }

    #[test]
    fn test_http_body_over_limit() {
        let url = serve_once("200 OK", vec![7u8; 64]);
        assert!(matches!(
            fetcher(false, 16).fetch(&url),
            Err(FetchError::TooLarge { limit: 16 })
        ));
    }

    #[test]
    fn test_http_connection_refused() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{}/image.jpg", port);
        assert!(matches!(fetcher(false, 1024).fetch(&url), Err(FetchError::Transport(_))));
    }

    #[test]
    fn test_unsupported_scheme() {
        let f = fetcher(true, 1024);
        match f.fetch("ftp://example.com/a.jpg") {
            Err(FetchError::UnsupportedScheme(s)) => assert_eq!(s, "ftp"),
            other => panic!("unexpected: {:?}", other.map(|b| b.len())),
        }
    }
}
