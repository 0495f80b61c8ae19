use reqwest::blocking::Client;
use source::{Scrape, ScrapeError, Scraper};
use std::time::Duration;

/// The configuration struct for `Http`.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// The targets to scrape, as (name, url) pairs, scraped in this order.
    pub endpoints: Vec<(String, String)>,
    /// How long a single target may take to answer.
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> HttpConfig {
        HttpConfig {
            endpoints: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// `Http` is a Scraper which GETs the metrics endpoint of each configured
/// target. Targets are fetched one after another; a slow target delays the
/// rest by at most the configured timeout.
pub struct Http {
    client: Client,
    endpoints: Vec<(String, String)>,
}

impl Http {
    /// Create a new `Http` scraper.
    pub fn new(config: HttpConfig) -> Result<Http, ScrapeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScrapeError::Unreachable(e.to_string()))?;
        Ok(Http {
            client: client,
            endpoints: config.endpoints,
        })
    }

    fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self.client
            .get(url)
            .send()
            .map_err(|e| ScrapeError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }
        response.text().map_err(|e| ScrapeError::Body(e.to_string()))
    }
}

impl Scraper for Http {
    fn scrape(&mut self) -> Result<Vec<Scrape>, ScrapeError> {
        let mut scrapes = Vec::with_capacity(self.endpoints.len());
        for &(ref name, ref url) in &self.endpoints {
            trace!("[http] scraping {} at {}", name, url);
            let scrape = match self.fetch(url) {
                Ok(body) => Scrape::ok(name.clone(), body),
                Err(e) => Scrape::failed(name.clone(), e),
            };
            scrapes.push(scrape);
        }
        Ok(scrapes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0; 1024];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}/metrics", addr)
    }

    fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/metrics", addr)
    }

    #[test]
    fn scrapes_each_endpoint_in_order() {
        let config = HttpConfig {
            endpoints: vec![
                ("agent".to_string(), serve_once("200 OK", "up 1\n")),
                ("hub".to_string(), serve_once("500 Internal Server Error", "")),
                ("gone".to_string(), closed_port()),
            ],
            timeout: Duration::from_secs(5),
        };
        let mut http = Http::new(config).unwrap();
        let scrapes = http.scrape().unwrap();

        assert_eq!(scrapes.len(), 3);
        assert_eq!(scrapes[0].target, "agent");
        assert_eq!(scrapes[0].body.as_ref().unwrap(), "up 1\n");
        assert_eq!(scrapes[1].target, "hub");
        match scrapes[1].body {
            Err(ScrapeError::Status(500)) => {}
            ref other => panic!("expected status error, got {:?}", other),
        }
        assert_eq!(scrapes[2].target, "gone");
        match scrapes[2].body {
            Err(ScrapeError::Unreachable(_)) => {}
            ref other => panic!("expected unreachable, got {:?}", other),
        }
    }
}
