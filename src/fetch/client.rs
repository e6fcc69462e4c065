// src/fetch/client.rs

use anyhow::{Context, Result};
use reqwest::{blocking::Client, StatusCode};
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use super::backoff::{Backoff, Sleep, ThreadSleep};
use super::response::{LookupResult, RegistryResponse};
use crate::cnpj::Cnpj;
use crate::config::LookupConfig;

/// Why an attempt did not yield a usable answer. Every variant is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// Timeout, refused connection, DNS failure and the like.
    Network(String),
    /// Anything but 200.
    HttpStatus(u16),
    /// 200 with a body that is not the JSON we expect.
    Malformed(String),
    /// 200 with a `status` other than "OK" (rate limiting, unknown CNPJ, ...).
    Api {
        status: Option<String>,
        message: Option<String>,
    },
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::Network(e) => write!(f, "network error: {}", e),
            RetryReason::HttpStatus(code) => write!(f, "HTTP {}", code),
            RetryReason::Malformed(e) => write!(f, "malformed body: {}", e),
            RetryReason::Api { status, message } => write!(
                f,
                "API status {}: {}",
                status.as_deref().unwrap_or("<none>"),
                message.as_deref().unwrap_or("<no message>")
            ),
        }
    }
}

/// Handed to the retry observer right before the client sleeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    pub attempt: u32,
    pub delay: Duration,
    pub reason: RetryReason,
}

#[derive(Debug, Error)]
pub enum LookupError {
    /// Only reachable when `LookupConfig::max_attempts` is set.
    #[error("gave up on {cnpj} after {attempts} attempts, last failure: {last}")]
    AttemptsExhausted {
        cnpj: Cnpj,
        attempts: u32,
        last: RetryReason,
    },
}

/// One request to the registry. Transport problems come back as a
/// [`RetryReason`]; semantic success is judged by [`LookupClient`].
pub trait RegistryApi {
    fn fetch(&self, cnpj: &Cnpj) -> std::result::Result<RegistryResponse, RetryReason>;
}

impl<T: RegistryApi + ?Sized> RegistryApi for &T {
    fn fetch(&self, cnpj: &Cnpj) -> std::result::Result<RegistryResponse, RetryReason> {
        (**self).fetch(cnpj)
    }
}

/// Blocking HTTP transport for the public registry.
pub struct HttpRegistry {
    client: Client,
    base: Url,
}

impl HttpRegistry {
    pub fn new(config: &LookupConfig) -> Result<Self> {
        // join() would replace the last segment without a trailing slash
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).with_context(|| format!("parsing registry URL {}", base))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("cnpjscraper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, base })
    }

    pub fn endpoint(&self, cnpj: &Cnpj) -> std::result::Result<Url, url::ParseError> {
        self.base.join(cnpj.as_str())
    }
}

impl RegistryApi for HttpRegistry {
    fn fetch(&self, cnpj: &Cnpj) -> std::result::Result<RegistryResponse, RetryReason> {
        let url = self
            .endpoint(cnpj)
            .map_err(|e| RetryReason::Network(e.to_string()))?;
        debug!(%url, "GET");

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| RetryReason::Network(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(RetryReason::HttpStatus(resp.status().as_u16()));
        }

        resp.json::<RegistryResponse>()
            .map_err(|e| RetryReason::Malformed(e.to_string()))
    }
}

/// Looks up one CNPJ, retrying until the registry answers "OK".
///
/// With the default configuration this never fails: every retryable outcome
/// (see [`RetryReason`]) is followed by a backoff sleep and a fresh request,
/// forever, until an answer arrives or the process is killed. Setting
/// `max_attempts` bounds the loop and turns exhaustion into
/// [`LookupError::AttemptsExhausted`].
pub struct LookupClient<A = HttpRegistry, S = ThreadSleep> {
    api: A,
    sleeper: S,
    config: LookupConfig,
}

impl LookupClient<HttpRegistry, ThreadSleep> {
    /// Production client: HTTP transport, real sleeps.
    pub fn from_config(config: LookupConfig) -> Result<Self> {
        let api = HttpRegistry::new(&config)?;
        Ok(Self::new(api, ThreadSleep, config))
    }
}

impl<A: RegistryApi, S: Sleep> LookupClient<A, S> {
    pub fn new(api: A, sleeper: S, config: LookupConfig) -> Self {
        Self {
            api,
            sleeper,
            config,
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn lookup(&self, cnpj: &Cnpj) -> std::result::Result<LookupResult, LookupError> {
        self.lookup_with(cnpj, |_| {})
    }

    /// Like [`lookup`](Self::lookup), reporting each retry to `on_retry`
    /// before sleeping.
    #[instrument(level = "debug", skip_all, fields(cnpj = %cnpj))]
    pub fn lookup_with(
        &self,
        cnpj: &Cnpj,
        mut on_retry: impl FnMut(&RetryNotice),
    ) -> std::result::Result<LookupResult, LookupError> {
        let mut backoff = Backoff::new(self.config.backoff);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let reason = match self.api.fetch(cnpj) {
                Ok(body) if body.is_ok() => {
                    debug!(attempt, "registry answered OK");
                    return Ok(LookupResult::from_response(cnpj.clone(), body));
                }
                Ok(body) => RetryReason::Api {
                    status: body.status().map(str::to_string),
                    message: body.message().map(str::to_string),
                },
                Err(reason) => reason,
            };

            if let Some(max) = self.config.max_attempts {
                if attempt >= max {
                    warn!(%cnpj, attempt, reason = %reason, "giving up");
                    return Err(LookupError::AttemptsExhausted {
                        cnpj: cnpj.clone(),
                        attempts: attempt,
                        last: reason,
                    });
                }
            }

            let delay = backoff.next_delay();
            warn!(%cnpj, attempt, delay_s = delay.as_secs(), reason = %reason, "retrying");
            on_retry(&RetryNotice {
                attempt,
                delay,
                reason,
            });
            self.sleeper.sleep(delay);
        }
    }
}
