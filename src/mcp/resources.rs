//! MCP Resources Support
//!
//! An in-memory resource catalog with cursor pagination and single-segment
//! URI templates.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Page size used when none (or a non-positive one) is requested.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Resource payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBody {
    Text(String),
    /// Base64-encoded bytes.
    Blob(String),
}

/// A catalog entry. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
    pub body: ResourceBody,
}

impl Resource {
    pub fn text(
        uri: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            body: ResourceBody::Text(text.into()),
        }
    }

    /// Build a binary resource, base64-encoding `bytes`.
    pub fn blob(
        uri: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            body: ResourceBody::Blob(STANDARD.encode(bytes)),
        }
    }

    /// Listing entry (no body).
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            uri: self.uri.clone(),
            name: self.name.clone(),
            mime_type: Some(self.mime_type.clone()),
        }
    }

    /// Body as returned by `resources/read`.
    pub fn contents(&self) -> ResourceContents {
        let (text, blob) = match &self.body {
            ResourceBody::Text(text) => (Some(text.clone()), None),
            ResourceBody::Blob(blob) => (None, Some(blob.clone())),
        };
        ResourceContents {
            uri: self.uri.clone(),
            mime_type: Some(self.mime_type.clone()),
            text,
            blob,
        }
    }
}

/// A resource as listed by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Resource contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>, // base64 encoded
}

/// One page of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePage {
    pub items: Vec<Resource>,
    pub next_cursor: Option<String>,
}

/// Result of resources/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    pub resources: Vec<ResourceDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl From<ResourcePage> for ListResourcesResult {
    fn from(page: ResourcePage) -> Self {
        Self {
            resources: page.items.iter().map(Resource::descriptor).collect(),
            next_cursor: page.next_cursor,
        }
    }
}

/// Result of resources/read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Params of resources/list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesParams {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

/// Params of resources/read.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// Documentation for a template placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    pub description: String,
}

/// A template as listed by `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDescriptor {
    pub uri_template: String,
    pub name: String,
    pub description: String,
    pub parameters: Vec<TemplateParameter>,
}

/// Result of resources/templates/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
}

/// A URI pattern with exactly one `{placeholder}` segment.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    prefix: String,
    suffix: String,
    parameter: String,
    matcher: Regex,
}

impl UriTemplate {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = || Error::InvalidTemplate(pattern.to_string());

        let open = pattern.find('{').ok_or_else(invalid)?;
        let close = pattern[open..].find('}').map(|i| open + i).ok_or_else(invalid)?;
        let parameter = &pattern[open + 1..close];
        let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);

        if parameter.is_empty() || suffix.contains('{') || suffix.contains('}') {
            return Err(invalid());
        }

        let matcher = Regex::new(&format!(
            "^{}([^/]+){}$",
            regex::escape(prefix),
            regex::escape(suffix)
        ))
        .map_err(|e| Error::InvalidTemplate(format!("{}: {}", pattern, e)))?;

        Ok(Self {
            pattern: pattern.to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            parameter: parameter.to_string(),
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// Substitute `value` for the placeholder.
    pub fn expand(&self, value: &str) -> String {
        format!("{}{}{}", self.prefix, value, self.suffix)
    }

    /// Extract the percent-decoded placeholder value from a concrete URI.
    pub fn extract(&self, uri: &str) -> Option<String> {
        self.matcher.captures(uri).and_then(|caps| {
            caps.get(1)
                .map(|m| percent_decode_str(m.as_str()).decode_utf8_lossy().into_owned())
        })
    }
}

/// A registered template plus its listing metadata.
#[derive(Debug, Clone)]
pub struct ResourceTemplate {
    pub template: UriTemplate,
    pub name: String,
    pub description: String,
    pub parameter_description: String,
}

impl ResourceTemplate {
    pub fn new(
        pattern: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_description: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            template: UriTemplate::parse(pattern)?,
            name: name.into(),
            description: description.into(),
            parameter_description: parameter_description.into(),
        })
    }

    pub fn descriptor(&self) -> ResourceTemplateDescriptor {
        ResourceTemplateDescriptor {
            uri_template: self.template.pattern().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: vec![TemplateParameter {
                name: self.template.parameter().to_string(),
                description: self.parameter_description.clone(),
            }],
        }
    }
}

/// Encode an offset as an opaque cursor.
pub fn encode_cursor(offset: usize) -> String {
    STANDARD.encode(offset.to_string())
}

/// Decode a cursor produced by [`encode_cursor`].
pub fn decode_cursor(cursor: &str) -> Result<usize> {
    let malformed = || Error::MalformedCursor(cursor.to_string());
    let bytes = STANDARD.decode(cursor).map_err(|_| malformed())?;
    let text = String::from_utf8(bytes).map_err(|_| malformed())?;
    text.trim().parse::<usize>().map_err(|_| malformed())
}

/// Ordered, immutable-entry resource catalog.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: Vec<Resource>,
    templates: Vec<ResourceTemplate>,
    default_page_size: usize,
}

impl ResourceCatalog {
    pub fn new(default_page_size: usize) -> Self {
        Self {
            resources: Vec::new(),
            templates: Vec::new(),
            default_page_size: if default_page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                default_page_size
            },
        }
    }

    /// The demo catalog: seven static resources and one template.
    pub fn with_static_resources(default_page_size: usize) -> Result<Self> {
        let mut catalog = Self::new(default_page_size);
        let base = "test://static/resource";

        catalog.add(Resource::text(
            format!("{}/1", base),
            "Resource 1",
            "text/plain",
            "Resource 1: This is a plaintext resource",
        ))?;
        catalog.add(Resource::blob(
            format!("{}/2", base),
            "Resource 2",
            "application/octet-stream",
            b"Resource 2: This is a base64 blob",
        ))?;
        catalog.add(Resource::text(
            format!("{}/3", base),
            "Resource 3 - Another Text",
            "text/plain",
            "Resource 3: More plaintext content here.",
        ))?;
        catalog.add(Resource::blob(
            format!("{}/4", base),
            "Resource 4 - Image (Fake)",
            "image/png",
            b"Fake PNG data",
        ))?;
        catalog.add(Resource::text(
            format!("{}/5", base),
            "Resource 5 - JSON Data",
            "application/json",
            json!({"key": "value", "number": 123}).to_string(),
        ))?;
        catalog.add(Resource::text(
            format!("{}/6", base),
            "Resource 6 - Long Text",
            "text/plain",
            "This is resource number six, and it has a slightly longer description to see how \
             text wrapping or truncation might be handled by a client.",
        ))?;
        catalog.add(Resource::blob(
            format!("{}/7", base),
            "Resource 7 - Another Blob",
            "application/octet-stream",
            b"Yet another piece of binary data for Resource 7",
        ))?;

        catalog.add_template(ResourceTemplate::new(
            &format!("{}/{{resource_id}}", base),
            "Static Resource",
            "A static resource with a numeric ID.",
            "The unique identifier for the static resource.",
        )?);

        Ok(catalog)
    }

    /// Append a resource. URIs are unique.
    pub fn add(&mut self, resource: Resource) -> Result<()> {
        if self.resources.iter().any(|r| r.uri == resource.uri) {
            return Err(Error::duplicate("resource", resource.uri));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn add_template(&mut self, template: ResourceTemplate) {
        self.templates.push(template);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// One page starting at the cursor's offset.
    ///
    /// A cursor that fails to decode restarts the listing at offset 0. A
    /// `page_size` of `None` or `<= 0` uses the catalog default.
    pub fn list(&self, cursor: Option<&str>, page_size: Option<i64>) -> ResourcePage {
        let start = match cursor {
            Some(cursor) => decode_cursor(cursor).unwrap_or_else(|e| {
                warn!("{}; listing from the start", e);
                0
            }),
            None => 0,
        };

        let size = match page_size {
            Some(n) if n > 0 => n as usize,
            _ => self.default_page_size,
        };

        let start = start.min(self.resources.len());
        let end = start.saturating_add(size).min(self.resources.len());
        let next_cursor = (end < self.resources.len()).then(|| encode_cursor(end));
        debug!("Listing resources [{}, {})", start, end);

        ResourcePage {
            items: self.resources[start..end].to_vec(),
            next_cursor,
        }
    }

    /// Exact-URI lookup, falling back to template resolution.
    pub fn get(&self, uri: &str) -> Result<&Resource> {
        if let Some(resource) = self.resources.iter().find(|r| r.uri == uri) {
            return Ok(resource);
        }

        self.templates
            .iter()
            .find_map(|t| t.template.extract(uri).map(|value| (t, value)))
            .and_then(|(t, value)| self.lookup(&t.template.expand(&value)))
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))
    }

    /// Resolve `value` against the template registered under `pattern`.
    pub fn get_by_template(&self, pattern: &str, value: &str) -> Result<&Resource> {
        let template = self
            .templates
            .iter()
            .find(|t| t.template.pattern() == pattern)
            .ok_or_else(|| Error::unknown("resource template", pattern))?;

        let uri = template.template.expand(value);
        self.lookup(&uri)
            .ok_or_else(|| Error::ResourceNotFound(uri))
    }

    fn lookup(&self, uri: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.uri == uri)
    }

    pub fn list_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        self.templates.iter().map(ResourceTemplate::descriptor).collect()
    }

    /// The first registered template, used for completion references.
    pub fn templates(&self) -> &[ResourceTemplate] {
        &self.templates
    }
}
