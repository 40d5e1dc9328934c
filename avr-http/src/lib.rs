//! Private HTTP/XML client for Denon and Marantz receivers
//!
//! The receiver exposes plain GET endpoints for commands and status documents, and a POST
//! endpoint (`AppCommand.xml`) for batched queries. Every response is XML; a receiver that is
//! busy or confused answers with an HTML page and a 200 status, which is reported as
//! [`HttpError::InvalidResponse`].

mod error;
pub mod appcommand;
pub mod urls;

pub use appcommand::{AppCommand, CommandParam};
pub use error::{HttpError, Result};
pub use urls::ZoneEndpoints;

use std::time::Duration;
use xmltree::Element;

/// Default HTTP port of the receiver's web interface
pub const DEFAULT_HTTP_PORT: u16 = 80;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// A blocking client for one receiver
#[derive(Debug, Clone)]
pub struct ReceiverClient {
    agent: ureq::Agent,
    host: String,
    port: u16,
}

impl ReceiverClient {
    /// Client for `host` on port 80 with default timeouts
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_timeouts(host, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_timeouts(host: impl Into<String>, connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
            host: host.into(),
            port: DEFAULT_HTTP_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn url(&self, path: &str) -> String {
        if self.port == DEFAULT_HTTP_PORT {
            format!("http://{}{}", self.host, path)
        } else {
            format!("http://{}:{}{}", self.host, self.port, path)
        }
    }

    /// GET `path` and return the body as text
    pub fn get(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);

        let response = self.agent.get(&url).call()?;
        response
            .into_string()
            .map_err(|e| HttpError::Network(e.to_string()))
    }

    /// GET `path` and parse the body as an XML document
    pub fn get_xml(&self, path: &str) -> Result<Element> {
        let body = self.get(path)?;
        parse_document(path, &body)
    }

    /// Send a command endpoint, ignoring the body
    pub fn get_command(&self, path: &str) -> Result<()> {
        self.get(path).map(|_| ())
    }

    /// POST a raw XML body and parse the XML answer
    pub fn post(&self, path: &str, body: &[u8]) -> Result<Element> {
        let url = self.url(path);
        tracing::debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .send_bytes(body)?;
        let text = response
            .into_string()
            .map_err(|e| HttpError::Network(e.to_string()))?;
        parse_document(path, &text)
    }

    /// POST a batch of AppCommands and return the annotated `<rx>` response
    pub fn post_appcommand(&self, path: &str, commands: &[AppCommand]) -> Result<Element> {
        let body = appcommand::build_body(commands)?;
        let root = self.post(path, &body)?;
        appcommand::annotate_response(path, commands, root)
    }

    /// Friendly name reported through `GetFriendlyName`
    pub fn friendly_name(&self) -> Result<String> {
        let command = AppCommand::get_friendly_name();
        let root = self.post_appcommand(urls::APPCOMMAND_URL, std::slice::from_ref(&command))?;

        appcommand::find_command(&root, "GetFriendlyName")
            .and_then(|cmd| cmd.get_child("friendlyname"))
            .and_then(|name| name.get_text())
            .map(|text| text.trim().to_string())
            .ok_or_else(|| HttpError::InvalidResponse {
                endpoint: urls::APPCOMMAND_URL.to_string(),
                reason: "missing friendlyname".to_string(),
            })
    }
}

/// Parse a response body and reject HTML pages
pub fn parse_document(endpoint: &str, body: &str) -> Result<Element> {
    let root = Element::parse(body.as_bytes()).map_err(|e| HttpError::Parse(e.to_string()))?;
    appcommand::check_xml_validity(endpoint, &root)?;
    Ok(root)
}
