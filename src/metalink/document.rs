//! Metalink document model and its XML form.

use super::ConversionError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// XML namespace declared on the root element
pub const METALINK_NAMESPACE: &str = "urn:ietf:params:xml:ns:metalink";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// A document describing downloadable files
#[derive(Debug, Clone, PartialEq)]
pub struct MetalinkDocument {
    /// Title the files belong to
    pub title: String,
    /// Tool identity written into the document
    pub generator: String,
    /// Publication time written into the document
    pub published: DateTime<Utc>,
    /// File entries, in document order
    pub files: Vec<MetalinkFile>,
}

/// A single downloadable file
#[derive(Debug, Clone, PartialEq)]
pub struct MetalinkFile {
    pub name: String,
    pub description: String,
    /// Size in bytes; an estimate, never measured
    pub size: u64,
    /// Download location
    pub url: String,
    pub hashes: Vec<FileHash>,
}

/// A checksum of a file
#[derive(Debug, Clone, PartialEq)]
pub struct FileHash {
    /// Algorithm name, e.g. `sha-256`
    pub kind: String,
    pub value: String,
}

impl MetalinkDocument {
    /// Creates an empty document published now
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            generator: format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            published: Utc::now(),
            files: Vec::new(),
        }
    }

    /// Adds a file entry
    pub fn add_file(&mut self, name: &str, description: &str, url: &str, size: u64) {
        self.files.push(MetalinkFile {
            name: name.to_string(),
            description: description.to_string(),
            size,
            url: url.to_string(),
            hashes: Vec::new(),
        });
    }

    /// Adds the entry for one episode of the title
    ///
    /// The file is named `<base_name>_Episodio_<NN>.mkv`.
    pub fn add_episode(&mut self, url: &str, base_name: &str, episode: u32, size: u64) {
        let name = format!("{}_Episodio_{:02}.mkv", base_name, episode);
        let description = format!("{} - Episodio {}", self.title, episode);
        self.add_file(&name, &description, url, size);
    }

    /// Sum of the file sizes
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Serializes the document to XML, declaration included
    pub fn to_xml(&self) -> Result<String, ConversionError> {
        let document = XmlMetalink {
            xmlns: METALINK_NAMESPACE,
            generator: &self.generator,
            published: self.published.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            files: self.files.iter().map(XmlFile::from).collect(),
        };

        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some("metalink"))?;
        serializer.indent(' ', 2);
        document.serialize(serializer)?;

        Ok(format!("{}\n{}\n", XML_DECLARATION, body))
    }
}

#[derive(Serialize)]
struct XmlMetalink<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    generator: &'a str,
    published: String,
    #[serde(rename = "file")]
    files: Vec<XmlFile<'a>>,
}

#[derive(Serialize)]
struct XmlFile<'a> {
    #[serde(rename = "@name")]
    name: &'a str,
    description: &'a str,
    size: u64,
    #[serde(rename = "url")]
    urls: Vec<XmlUrl<'a>>,
    #[serde(rename = "hash", skip_serializing_if = "Vec::is_empty")]
    hashes: Vec<XmlHash<'a>>,
}

#[derive(Serialize)]
struct XmlUrl<'a> {
    #[serde(rename = "@location")]
    location: &'a str,
    #[serde(rename = "@preference")]
    preference: u32,
    #[serde(rename = "$text")]
    value: &'a str,
}

#[derive(Serialize)]
struct XmlHash<'a> {
    #[serde(rename = "@type")]
    kind: &'a str,
    #[serde(rename = "$text")]
    value: &'a str,
}

impl<'a> From<&'a MetalinkFile> for XmlFile<'a> {
    fn from(file: &'a MetalinkFile) -> Self {
        Self {
            name: &file.name,
            description: &file.description,
            size: file.size,
            // Files are hosted by cloud storage providers, one mirror each
            urls: vec![XmlUrl {
                location: "cloud",
                preference: 100,
                value: &file.url,
            }],
            hashes: file
                .hashes
                .iter()
                .map(|h| XmlHash {
                    kind: &h.kind,
                    value: &h.value,
                })
                .collect(),
        }
    }
}
