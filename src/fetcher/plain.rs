//! Plain HTTP page source.

use super::{FetchBudget, FetchError, PageSource};
use crate::config::SiteConfig;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

/// Page source performing a direct GET without script execution.
///
/// Requests carry a browser-like header set so that naive bot filters
/// treat them like a regular visit.
pub(crate) struct PlainSource {
    client: reqwest::blocking::Client,
}

impl PlainSource {
    /// Creates a source sending the headers configured for the site.
    pub fn new(site: &SiteConfig) -> Result<Self, FetchError> {
        let headers = browser_headers(site)?;

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self { client })
    }
}

/// Builds the header set sent with every plain request.
fn browser_headers(site: &SiteConfig) -> Result<HeaderMap, FetchError> {
    let value = |raw: &str| {
        HeaderValue::from_str(raw)
            .map_err(|e| FetchError::Request(format!("Invalid header value {:?}: {}", raw, e)))
    };

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, value(&site.user_agent)?);
    headers.insert(ACCEPT, value(&site.accept)?);
    headers.insert(ACCEPT_LANGUAGE, value(&site.accept_language)?);
    Ok(headers)
}

impl PageSource for PlainSource {
    fn fetch_html(&self, url: &Url, budget: FetchBudget) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(budget.timeout)
            .send()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        response
            .text()
            .map_err(|e| FetchError::Request(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serves one canned response and hands back the raw request head
    fn serve_once(status_line: &'static str, body: &'static str) -> (Url, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            tx.send(head).unwrap();

            let response = format!(
                "{}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });

        let url = Url::parse(&format!("http://127.0.0.1:{}/anime/test", port)).unwrap();
        (url, rx)
    }

    #[test]
    fn test_fetch_sends_browser_headers() {
        let (url, requests) = serve_once("HTTP/1.1 200 OK", "<html><body>ok</body></html>");
        let source = PlainSource::new(&SiteConfig::default()).unwrap();

        let html = source
            .fetch_html(&url, FetchBudget::plain(&TimingConfig::default()))
            .unwrap();
        assert_eq!(html, "<html><body>ok</body></html>");

        let head = requests.recv().unwrap().to_lowercase();
        assert!(head.starts_with("get /anime/test "));
        assert!(head.contains("user-agent: mozilla/5.0"));
        assert!(head.contains("accept-language: es-es"));
    }

    #[test]
    fn test_non_ok_status_is_an_error() {
        let (url, _requests) = serve_once("HTTP/1.1 404 Not Found", "missing");
        let source = PlainSource::new(&SiteConfig::default()).unwrap();

        let result = source.fetch_html(&url, FetchBudget::plain(&TimingConfig::default()));
        assert!(matches!(result, Err(FetchError::Status(404))));
    }

    #[test]
    fn test_invalid_header_value() {
        let site = SiteConfig {
            user_agent: "bad\nagent".to_string(),
            ..SiteConfig::default()
        };
        assert!(PlainSource::new(&site).is_err());
    }
}
