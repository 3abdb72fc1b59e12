// src/pkg/descriptor.rs

//! Package descriptor extraction
//!
//! A CRX content package is a zip archive carrying its metadata in
//! `META-INF/vault/properties.xml` (Java properties XML). The descriptor
//! read here is the local half of state resolution: name, group and
//! version as the artifact declares them.

use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Path of the descriptor inside the package archive
const PROPERTIES_ENTRY: &str = "META-INF/vault/properties.xml";

/// Identity of a package as declared by its embedded descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    pub group: String,
    pub version: String,
}

/// Reads a [`PackageDescriptor`] out of a local package artifact
pub trait PackageMetadataReader {
    fn read_descriptor(&self, local_path: &Path) -> Result<PackageDescriptor>;
}

/// Descriptor reader for vault-format (zip) content packages
#[derive(Debug, Default)]
pub struct VaultDescriptorReader;

impl PackageMetadataReader for VaultDescriptorReader {
    fn read_descriptor(&self, local_path: &Path) -> Result<PackageDescriptor> {
        let file = File::open(local_path).map_err(|e| {
            Error::MetadataParse(format!("Failed to open {}: {e}", local_path.display()))
        })?;

        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Error::MetadataParse(format!("{} is not a package archive: {e}", local_path.display()))
        })?;

        let mut entry = archive.by_name(PROPERTIES_ENTRY).map_err(|e| {
            Error::MetadataParse(format!(
                "{} has no {PROPERTIES_ENTRY}: {e}",
                local_path.display()
            ))
        })?;

        let mut xml = Vec::new();
        entry.read_to_end(&mut xml).map_err(|e| {
            Error::MetadataParse(format!("Failed to read {PROPERTIES_ENTRY}: {e}"))
        })?;

        let descriptor = parse_properties_xml(&xml)?;
        debug!(
            "Descriptor of {}: name={} group={} version={}",
            local_path.display(),
            descriptor.name,
            descriptor.group,
            descriptor.version
        );
        Ok(descriptor)
    }
}

/// Parse a Java properties XML document into a descriptor
///
/// Requires `name`, `group` and `version` entries; anything else in the
/// file is ignored.
pub fn parse_properties_xml(xml: &[u8]) -> Result<PackageDescriptor> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut entries: HashMap<String, String> = HashMap::new();
    let mut current_key: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"entry" => {
                current_key = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| {
                        Error::MetadataParse(format!("Bad attribute in properties.xml: {e}"))
                    })?;
                    if attr.key.as_ref() == b"key" {
                        let value = attr.unescape_value().map_err(|e| {
                            Error::MetadataParse(format!("Bad key in properties.xml: {e}"))
                        })?;
                        current_key = Some(value.into_owned());
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(key) = current_key.take() {
                    let value = t.unescape().map_err(|e| {
                        Error::MetadataParse(format!("Bad value in properties.xml: {e}"))
                    })?;
                    entries.insert(key, value.into_owned());
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"entry" => {
                current_key = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::MetadataParse(format!(
                    "Malformed properties.xml: {e}"
                )))
            }
        }
    }

    let required = |key: &str| -> Result<String> {
        entries
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                Error::MetadataParse(format!("properties.xml is missing '{key}'"))
            })
    };

    Ok(PackageDescriptor {
        name: required("name")?,
        group: required("group")?,
        version: required("version")?,
    })
}
