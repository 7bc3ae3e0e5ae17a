//! Blocking HTTP fetches of remote DTDs and schemas.
//!
//! Only the entity resolver talks HTTP. Connection failures, timeouts and
//! 5xx responses are retried with exponential backoff; anything else fails
//! on the first attempt.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;

use crate::error::{LoaderError, Result};

const USER_AGENT: &str = concat!("jobsched-loader/", env!("CARGO_PKG_VERSION"));

/// Media types a grammar is served as.
const ENTITY_ACCEPT: &str =
    "application/xml-dtd, application/xml, text/xml;q=0.9, text/plain;q=0.5, */*;q=0.1";

/// Largest entity body the loader reads (4 MiB).
pub const MAX_ENTITY_BYTES: usize = 4 * 1024 * 1024;

const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Outcome of one request.
enum Attempt {
    Fetched(Vec<u8>),
    Retry(String),
}

/// Create the client used for entity requests.
///
/// # Arguments
/// * `timeout` - Per-request timeout
pub fn create_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Fetch an external entity.
///
/// # Errors
/// [`LoaderError::Http`] for a 4xx response or a request that cannot be
/// sent, [`LoaderError::EntityTooLarge`] for bodies over
/// [`MAX_ENTITY_BYTES`], and [`LoaderError::RetriesExhausted`] once every
/// attempt hit a transient failure.
pub fn fetch_entity(client: &Client, url: &str) -> Result<Vec<u8>> {
    let mut last_failure = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            // 500ms, then 1000ms
            let delay = RETRY_BASE_DELAY_MS << (attempt - 2);
            tracing::debug!(url, attempt, delay_ms = delay, "Retrying entity request");
            thread::sleep(Duration::from_millis(delay));
        }

        match request(client, url)? {
            Attempt::Fetched(bytes) => {
                tracing::debug!(url, bytes = bytes.len(), "Fetched entity");
                return Ok(bytes);
            }
            Attempt::Retry(reason) => {
                tracing::warn!(
                    url,
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    reason = %reason,
                    "Entity request failed, will retry"
                );
                last_failure = reason;
            }
        }
    }

    Err(LoaderError::RetriesExhausted {
        attempts: MAX_ATTEMPTS,
        message: last_failure,
    })
}

fn request(client: &Client, url: &str) -> Result<Attempt> {
    let response = match client.get(url).header(ACCEPT, ENTITY_ACCEPT).send() {
        Ok(response) => response,
        Err(e) if e.is_connect() || e.is_timeout() => return Ok(Attempt::Retry(e.to_string())),
        Err(e) => return Err(e.into()),
    };

    let status = response.status();
    if status.is_server_error() {
        return Ok(Attempt::Retry(format!("Server error: {status}")));
    }
    read_body(response.error_for_status()?, url).map(Attempt::Fetched)
}

fn read_body(response: Response, url: &str) -> Result<Vec<u8>> {
    let too_large = || LoaderError::EntityTooLarge {
        url: url.to_string(),
        limit: MAX_ENTITY_BYTES,
    };

    if response
        .content_length()
        .is_some_and(|length| length > MAX_ENTITY_BYTES as u64)
    {
        return Err(too_large());
    }
    let bytes = response.bytes()?;
    if bytes.len() > MAX_ENTITY_BYTES {
        return Err(too_large());
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn serve(runtime: &Runtime, route: &str, response: ResponseTemplate, hits: u64) -> MockServer {
        runtime.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(route))
                .and(header_exists("accept"))
                .respond_with(response)
                .expect(hits)
                .mount(&server)
                .await;
            server
        })
    }

    fn client() -> Client {
        create_client(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_create_client() {
        assert!(create_client(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_fetch_entity() {
        let runtime = Runtime::new().unwrap();
        let server = serve(
            &runtime,
            "/jobs.dtd",
            ResponseTemplate::new(200).set_body_string("<!ELEMENT jobs EMPTY>"),
            1,
        );

        let bytes = fetch_entity(&client(), &format!("{}/jobs.dtd", server.uri())).unwrap();
        assert_eq!(bytes, b"<!ELEMENT jobs EMPTY>");
    }

    #[test]
    fn test_client_error_is_not_retried() {
        let runtime = Runtime::new().unwrap();
        let server = serve(&runtime, "/gone.dtd", ResponseTemplate::new(404), 1);

        let err = fetch_entity(&client(), &format!("{}/gone.dtd", server.uri())).unwrap_err();
        assert!(matches!(err, LoaderError::Http(_)));
    }

    #[test]
    fn test_server_error_is_retried_until_exhausted() {
        let runtime = Runtime::new().unwrap();
        let server = serve(&runtime, "/flaky.dtd", ResponseTemplate::new(503), 3);

        let err = fetch_entity(&client(), &format!("{}/flaky.dtd", server.uri())).unwrap_err();
        assert!(
            matches!(err, LoaderError::RetriesExhausted { attempts: 3, ref message } if message.contains("503"))
        );
    }

    #[test]
    fn test_oversized_entity_is_rejected() {
        let runtime = Runtime::new().unwrap();
        let body = vec![b' '; MAX_ENTITY_BYTES + 1];
        let server = serve(
            &runtime,
            "/huge.xsd",
            ResponseTemplate::new(200).set_body_bytes(body),
            1,
        );

        let err = fetch_entity(&client(), &format!("{}/huge.xsd", server.uri())).unwrap_err();
        assert!(matches!(err, LoaderError::EntityTooLarge { limit: MAX_ENTITY_BYTES, .. }));
    }
}
