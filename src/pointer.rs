//! Location pointers for reported violations
//!
//! A pointer is an XPointer-style string made of a namespace binding and an
//! abbreviated path, e.g.
//! `xmlns(tns=http://www.opengis.net/kml/2.2)xpointer((//tns:Placemark)[3])`.
//! The index counts every element of the document with the same expanded
//! name, in document order, so it depends only on the node and the document.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::document::{Document, NodeId};

/// Prefix used when the element was written without one
const DEFAULT_PREFIX: &str = "tns";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NamespaceBinding {
    prefix: String,
    uri: String,
}

/// Serializable description of a node's position in its document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationPointer {
    binding: Option<NamespaceBinding>,
    path: String,
}

impl LocationPointer {
    /// Pointer to the document itself
    pub fn document() -> Self {
        Self {
            binding: None,
            path: "/".to_string(),
        }
    }

    /// Derive the pointer of an element from its position in the document
    pub fn for_node(doc: &Document, id: NodeId) -> Self {
        let target = doc.node(id);
        let name = target.name();

        let position = doc
            .nodes()
            .take(id.index() + 1)
            .filter(|n| {
                let other = n.name();
                other.local == name.local && other.namespace == name.namespace
            })
            .count();

        match &name.namespace {
            Some(uri) => {
                let prefix = name
                    .prefix
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
                let path = format!("(//{}:{})[{}]", prefix, name.local, position);
                Self {
                    binding: Some(NamespaceBinding {
                        prefix,
                        uri: uri.clone(),
                    }),
                    path,
                }
            }
            None => Self {
                binding: None,
                path: format!("(//{})[{}]", name.local, position),
            },
        }
    }

    /// The abbreviated path without the namespace context
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for LocationPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(binding) = &self.binding {
            write!(f, "xmlns({}={})", binding.prefix, binding.uri)?;
        }
        write!(f, "xpointer({})", self.path)
    }
}

impl Serialize for LocationPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
