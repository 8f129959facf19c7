use crate::config::ProbeConfig;
use crate::error::{ConfigError, ProbeError};
use crate::sampler::Sample;
use reqwest::header::{HOST, HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use std::net::IpAddr;
use tokio::time::Instant;

/// A URL plus the `Host` header to send with it, when it differs from the
/// URL's own authority.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub url: Url,
    pub host_header: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HeadOutcome {
    pub status: u16,
    pub redirects: usize,
    /// The hop that produced `status`.
    pub final_target: Target,
}

#[derive(Clone)]
pub struct HttpProber {
    head_client: Client,
    content_client: Client,
    max_redirects: usize,
}

impl HttpProber {
    pub fn new(config: &ProbeConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in config.parsed_headers()? {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
            headers.append(header, value);
        }

        // redirects are followed by hand so every hop is counted
        let builder = || {
            Client::builder()
                .redirect(Policy::none())
                .timeout(config.op_timeout())
                .user_agent(config.user_agent())
                .default_headers(headers.clone())
        };

        Ok(Self {
            head_client: builder().build()?,
            // no idle pooling: each content sample gets a fresh connection
            content_client: builder().pool_max_idle_per_host(0).build()?,
            max_redirects: config.max_redirects,
        })
    }

    /// HEAD `url` with `Host: hostname`, following redirects.
    ///
    /// `ip` is the address `hostname` resolved to; redirects pointing back at
    /// `hostname` over plain HTTP are sent to it directly.
    pub async fn head_with_redirects(
        &self,
        url: &str,
        hostname: &str,
        ip: IpAddr,
    ) -> Result<HeadOutcome, ProbeError> {
        let mut current = Target {
            url: Url::parse(url).map_err(|e| ProbeError::http(url, e))?,
            host_header: Some(hostname.to_string()),
        };
        let mut redirects = 0;

        loop {
            let mut req = self.head_client.head(current.url.clone());
            if let Some(host) = &current.host_header {
                req = req.header(HOST, host);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| ProbeError::http(current.url.as_str(), report(&e)))?;

            let status = resp.status();
            let location = resp.headers().get(LOCATION).cloned();
            match location {
                Some(loc) if is_followed_redirect(status) => {
                    if redirects >= self.max_redirects {
                        return Err(ProbeError::http(
                            current.url.as_str(),
                            format!("exceeded {} redirects", self.max_redirects),
                        ));
                    }
                    let loc = loc
                        .to_str()
                        .map_err(|_| ProbeError::http(current.url.as_str(), "non-ASCII Location header"))?;
                    current = next_hop(&current, loc, hostname, ip)?;
                    redirects += 1;
                }
                _ => {
                    return Ok(HeadOutcome {
                        status: status.as_u16(),
                        redirects,
                        final_target: current,
                    });
                }
            }
        }
    }

    /// GET `target` and time the body download, from response headers to the
    /// last byte.
    pub async fn fetch_content(&self, target: &Target) -> Result<Sample, ProbeError> {
        let url = target.url.as_str();
        let mut req = self.content_client.get(target.url.clone());
        if let Some(host) = &target.host_header {
            req = req.header(HOST, host);
        }
        let mut resp = req
            .send()
            .await
            .map_err(|e| ProbeError::content(url, report(&e)))?;
        if resp.status() != StatusCode::OK {
            return Err(ProbeError::content(url, format!("unexpected status {}", resp.status())));
        }

        let start = Instant::now();
        let mut bytes = 0u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| ProbeError::content(url, report(&e)))?
        {
            bytes += chunk.len() as u64;
        }
        Ok(Sample::transfer(start.elapsed(), bytes))
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn next_hop(current: &Target, location: &str, hostname: &str, ip: IpAddr) -> Result<Target, ProbeError> {
    let mut next = current
        .url
        .join(location)
        .map_err(|e| ProbeError::http(current.url.as_str(), format!("bad Location {location:?}: {e}")))?;

    let same_authority = next.host_str() == current.url.host_str()
        && next.port_or_known_default() == current.url.port_or_known_default();
    if same_authority {
        return Ok(Target {
            url: next,
            host_header: current.host_header.clone(),
        });
    }

    let back_to_probed_host = next.scheme() == "http"
        && next
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(hostname));
    if back_to_probed_host && next.set_ip_host(ip).is_ok() {
        return Ok(Target {
            url: next,
            host_header: Some(hostname.to_string()),
        });
    }

    Ok(Target {
        url: next,
        host_header: None,
    })
}

/// Error message with its source chain, reqwest's top-level message alone
/// rarely says what went wrong.
fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = err.to_string();
    while let Some(src) = err.source() {
        s.push_str(": ");
        s.push_str(&src.to_string());
        err = src;
    }
    s
}
