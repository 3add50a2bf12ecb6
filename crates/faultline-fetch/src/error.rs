use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),
    #[error("git protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(String),
    #[error("failed to decode API response: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_repository_unavailable(&self) -> bool {
        matches!(self, Self::RepositoryUnavailable(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return classify_http_status(status.as_u16(), None, &err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

const UNAVAILABLE_MARKERS: &[&str] = &[
    "repository not found",
    "does not appear to be a git repository",
    "could not read username",
    "could not read password",
    "terminal prompts disabled",
    "authentication failed",
    "access denied",
    "permission denied",
    "the requested url returned error: 401",
    "the requested url returned error: 403",
    "the requested url returned error: 404",
    "the requested url returned error: 410",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection was aborted",
    "could not resolve host",
    "temporary failure in name resolution",
    "early eof",
    "rpc failed",
    "the remote end hung up unexpectedly",
    "unexpected disconnect",
    "gnutls_handshake",
    "ssl_read",
    "the requested url returned error: 429",
    "the requested url returned error: 500",
    "the requested url returned error: 502",
    "the requested url returned error: 503",
    "the requested url returned error: 504",
];

/// Maps the stderr of a failed git command onto the error taxonomy.
/// Unavailability wins over transient markers: a missing repository often
/// also ends with "the remote end hung up".
pub fn classify_git_failure(stderr: &str) -> FetchError {
    let lowered = stderr.to_ascii_lowercase();
    let message = last_meaningful_line(stderr);

    if UNAVAILABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return FetchError::RepositoryUnavailable(message);
    }
    if TRANSIENT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return FetchError::Transient(message);
    }
    FetchError::Protocol(message)
}

/// `ratelimit_remaining` is the value of the `x-ratelimit-remaining` header;
/// a 403 with no budget left is a rate limit, not a permission problem.
pub fn classify_http_status(
    status: u16,
    ratelimit_remaining: Option<&str>,
    message: &str,
) -> FetchError {
    let detail = format!("HTTP {status}: {message}");
    match status {
        429 | 500..=599 => FetchError::Transient(detail),
        403 if ratelimit_remaining.map(str::trim) == Some("0") => FetchError::Transient(detail),
        401 | 403 | 404 | 410 | 422 => FetchError::RepositoryUnavailable(detail),
        _ => FetchError::Http(detail),
    }
}

fn last_meaningful_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("git failed without output")
        .to_owned()
}
