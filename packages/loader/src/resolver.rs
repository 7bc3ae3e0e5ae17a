//! Resolution of DTD and schema references to readable streams.
//!
//! Resolution is best effort. Every failure is logged and reported as
//! `None` so that validation can record a problem instead of aborting.

use std::cell::OnceCell;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

use crate::config::{
    LoaderConfig, DTD_RESOURCE, PUBLIC_ID, RESOURCE_PREFIX, SCHEMA_URL, SYSTEM_ID, XSD_RESOURCE,
};
use crate::error::Result;
use crate::http;

/// Grammars compiled into the crate.
const BUNDLED: &[(&str, &str)] = &[
    (DTD_RESOURCE, include_str!("../resources/job_scheduling_data_1_0.dtd")),
    (XSD_RESOURCE, include_str!("../resources/job_scheduling_data_1_1.xsd")),
];

/// Where a resolved stream came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A grammar compiled into the crate.
    Bundled(&'static str),
    /// A file found under one of the resource roots.
    Resource(PathBuf),
    /// A filesystem path named directly.
    File(PathBuf),
    /// A `file:` or `http(s):` URL.
    Url(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled(name) => write!(f, "bundled resource {name}"),
            Self::Resource(path) => write!(f, "resource {}", path.display()),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// An opened entity together with the identifiers it was requested by.
pub struct InputSource {
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub origin: Origin,
    stream: Box<dyn Read>,
}

impl InputSource {
    #[must_use]
    pub fn new(origin: Origin, stream: Box<dyn Read>) -> Self {
        Self {
            public_id: None,
            system_id: None,
            origin,
            stream,
        }
    }

    #[must_use]
    pub fn with_ids(mut self, public_id: Option<&str>, system_id: Option<&str>) -> Self {
        self.public_id = public_id.map(str::to_string);
        self.system_id = system_id.map(str::to_string);
        self
    }

    /// Read the whole stream as UTF-8 text.
    pub fn into_string(mut self) -> Result<String> {
        let mut text = String::new();
        self.stream.read_to_string(&mut text)?;
        Ok(text)
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSource")
            .field("public_id", &self.public_id)
            .field("system_id", &self.system_id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Finds named resources among the bundled grammars and resource roots.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocator {
    bundled: bool,
    roots: Vec<PathBuf>,
}

impl ResourceLocator {
    #[must_use]
    pub fn new(bundled: bool, roots: Vec<PathBuf>) -> Self {
        Self { bundled, roots }
    }

    #[must_use]
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.bundled_resources, config.resource_roots.clone())
    }

    /// Name and text of a grammar compiled into the crate.
    #[must_use]
    pub fn bundled(name: &str) -> Option<(&'static str, &'static str)> {
        BUNDLED
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .copied()
    }

    /// Open a resource by name.
    ///
    /// Bundled grammars are tried first, then each root in order. Names
    /// containing `:` and absolute paths are never resources.
    #[must_use]
    pub fn locate(&self, name: &str) -> Option<InputSource> {
        if !is_resource_name(name) {
            return None;
        }

        if self.bundled {
            if let Some((bundled_name, text)) = Self::bundled(name) {
                tracing::trace!(name, "Found bundled resource");
                return Some(InputSource::new(
                    Origin::Bundled(bundled_name),
                    Box::new(Cursor::new(text.as_bytes())),
                ));
            }
        }

        for root in &self.roots {
            let path = root.join(name);
            if !path.is_file() {
                continue;
            }
            match File::open(&path) {
                Ok(file) => {
                    tracing::trace!(path = %path.display(), "Found resource");
                    return Some(InputSource::new(Origin::Resource(path), Box::new(file)));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to open resource");
                }
            }
        }

        None
    }
}

fn is_resource_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(':') && !Path::new(name).is_absolute()
}

/// Resolves public and system identifiers to input sources.
pub struct EntityResolver {
    locator: ResourceLocator,
    http_timeout: Duration,
    client: OnceCell<Option<Client>>,
}

impl EntityResolver {
    #[must_use]
    pub fn new(locator: ResourceLocator, http_timeout: Duration) -> Self {
        Self {
            locator,
            http_timeout,
            client: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(ResourceLocator::from_config(config), config.http_timeout)
    }

    #[must_use]
    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Resolve an external entity.
    ///
    /// Without a public id the system id is tried, in order, as a well-known
    /// identifier, as a resource name, as a `resource:` name, and finally as
    /// a filesystem path (no `:`) or URL. With a public id, the loader's own
    /// public id maps to the bundled DTD and any other opens the system id
    /// as a URL.
    pub fn resolve(&self, public_id: Option<&str>, system_id: Option<&str>) -> Option<InputSource> {
        let source = match public_id {
            None => system_id.and_then(|system_id| self.resolve_system_id(system_id)),
            Some(public) if public == PUBLIC_ID => self.locator.locate(DTD_RESOURCE),
            Some(_) => system_id.and_then(|system_id| self.open_url(system_id)),
        };

        match source {
            Some(source) => {
                tracing::debug!(
                    public_id,
                    system_id,
                    origin = %source.origin,
                    "Resolved entity"
                );
                Some(source.with_ids(public_id, system_id))
            }
            None => {
                tracing::warn!(public_id, system_id, "Could not resolve entity");
                None
            }
        }
    }

    /// Find the XML Schema: a local copy first, then the published location.
    pub fn locate_schema(&self) -> Option<InputSource> {
        self.locator
            .locate(XSD_RESOURCE)
            .or_else(|| self.open_url(SCHEMA_URL))
            .map(|source| source.with_ids(None, Some(SCHEMA_URL)))
    }

    fn resolve_system_id(&self, system_id: &str) -> Option<InputSource> {
        let well_known = match system_id {
            SYSTEM_ID => Some(DTD_RESOURCE),
            SCHEMA_URL => Some(XSD_RESOURCE),
            _ => None,
        };
        if let Some(source) = well_known.and_then(|name| self.locator.locate(name)) {
            return Some(source);
        }

        if let Some(source) = self.locator.locate(system_id) {
            return Some(source);
        }

        if let Some(name) = system_id.strip_prefix(RESOURCE_PREFIX) {
            return self.locator.locate(name);
        }

        if system_id.contains(':') {
            self.open_url(system_id)
        } else {
            open_file(Path::new(system_id))
        }
    }

    fn open_url(&self, location: &str) -> Option<InputSource> {
        let url = match Url::parse(location) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = location, error = %e, "Invalid entity URL");
                return None;
            }
        };

        match url.scheme() {
            "file" => {
                let path = url.to_file_path().ok()?;
                open_file(&path).map(|source| InputSource {
                    origin: Origin::Url(location.to_string()),
                    ..source
                })
            }
            "http" | "https" => {
                let client = self.client()?;
                match http::fetch_entity(client, url.as_str()) {
                    Ok(bytes) => Some(InputSource::new(
                        Origin::Url(location.to_string()),
                        Box::new(Cursor::new(bytes)),
                    )),
                    Err(e) => {
                        tracing::warn!(url = location, error = %e, "Failed to download entity");
                        None
                    }
                }
            }
            scheme => {
                tracing::warn!(url = location, scheme, "Unsupported entity URL scheme");
                None
            }
        }
    }

    fn client(&self) -> Option<&Client> {
        self.client
            .get_or_init(|| match http::create_client(self.http_timeout) {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create HTTP client");
                    None
                }
            })
            .as_ref()
    }
}

impl fmt::Debug for EntityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityResolver")
            .field("locator", &self.locator)
            .field("http_timeout", &self.http_timeout)
            .finish_non_exhaustive()
    }
}

fn open_file(path: &Path) -> Option<InputSource> {
    match File::open(path) {
        Ok(file) => Some(InputSource::new(
            Origin::File(path.to_path_buf()),
            Box::new(file),
        )),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to open entity file");
            None
        }
    }
}
