use snafu::prelude::*;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{method} {url} failed: {source}"))]
    RequestError {
        url: String,
        method: String,
        source: Box<ureq::Error>,
    },
    #[snafu(display("{message}"))]
    ResponseError { message: String },
    #[snafu(display("{provider}: {message}: {source}"))]
    ProviderError {
        provider: String,
        message: String,
        source: BoxedError,
    },
    #[snafu(display("{prefix}: {message}"))]
    ConfigError { message: String, prefix: String },
    #[snafu(display("{message}"))]
    RecordError { message: String },
    #[snafu(display("line {line}: {message}"))]
    ParseError { line: usize, message: String },
    #[snafu(display("{domain}: {message}"))]
    ValidationError { domain: String, message: String },
    #[snafu(display("{label} {rtype}: {message}"))]
    AuditError {
        label: String,
        rtype: String,
        message: String,
    },
    #[snafu(display("provider {provider} does not support {capability}"))]
    CapabilityError {
        provider: String,
        capability: String,
    },
    #[snafu(display("{}: {source}", path.display()))]
    IoError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("spf: {message}"))]
    SpfError { message: String },
    #[snafu(display("{rtype} lookup of {fqdn} failed: {source}"))]
    LookupError {
        fqdn: String,
        rtype: String,
        source: BoxedError,
    },
    #[snafu(display("no cached {rtype} answer for {fqdn} and the cache is preloaded"))]
    CacheMissError { fqdn: String, rtype: String },
    #[snafu(display("{domain}: worker thread panicked"))]
    WorkerError { domain: String },
    #[snafu(display("{domain}: cancelled"))]
    CancelledError { domain: String },
}

impl Error {
    /// True for errors raised before any provider I/O happened.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::ValidationError { .. } | Error::AuditError { .. } | Error::CapabilityError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
