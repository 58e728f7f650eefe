//! Tool descriptors and the registry they live in

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::capabilities::Capability;
use crate::matcher::normalize;

/// Problems detected while registering tools
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool name must not be empty")]
    EmptyName,

    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("a fallback tool is already registered ('{0}')")]
    DuplicateFallback(String),

    #[error("no fallback tool registered")]
    MissingFallback,
}

/// A named capability together with the keywords that route to it
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Normalized trigger keywords; multi-word entries are phrases
    pub keywords: Vec<String>,
    pub capability: Arc<dyn Capability>,
    /// The terminal general-purpose tool; never matched, never validated
    pub is_fallback: bool,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("keywords", &self.keywords)
            .field("is_fallback", &self.is_fallback)
            .finish()
    }
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        capability: Arc<dyn Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            keywords: Vec::new(),
            capability,
            is_fallback: false,
        }
    }

    /// General-purpose tool used when nothing else answers
    pub fn fallback(
        name: impl Into<String>,
        description: impl Into<String>,
        capability: Arc<dyn Capability>,
    ) -> Self {
        Self {
            is_fallback: true,
            ..Self::new(name, description, capability)
        }
    }

    /// Set trigger keywords. Keywords are normalized the same way queries are;
    /// blanks and duplicates are dropped, first occurrence wins.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for kw in keywords {
            let kw = normalize(kw.as_ref());
            if !kw.is_empty() && !normalized.contains(&kw) {
                normalized.push(kw);
            }
        }
        self.keywords = normalized;
        self
    }
}

/// Registry of tools, in registration order.
///
/// Built once at startup and then shared read-only (the router holds it in
/// an `Arc` and exposes no mutation).
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    fallback: Option<usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. At most one tool may be flagged as fallback.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index_of(&descriptor.name).is_some() {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }
        if descriptor.is_fallback {
            if let Some(existing) = self.fallback {
                return Err(RegistryError::DuplicateFallback(
                    self.tools[existing].name.clone(),
                ));
            }
            self.fallback = Some(self.tools.len());
        }
        debug!(
            "Registering tool: {} ({} keywords{})",
            descriptor.name,
            descriptor.keywords.len(),
            if descriptor.is_fallback { ", fallback" } else { "" }
        );
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Registration index of a tool
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tools.iter().position(|t| t.name == name)
    }

    pub fn by_index(&self, index: usize) -> Option<&ToolDescriptor> {
        self.tools.get(index)
    }

    pub fn fallback(&self) -> Option<&ToolDescriptor> {
        self.fallback.map(|i| &self.tools[i])
    }

    /// All tools in registration order, fallback included
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    /// Non-fallback tools with their registration index
    pub fn specialized(&self) -> impl Iterator<Item = (usize, &ToolDescriptor)> {
        self.tools.iter().enumerate().filter(|(_, t)| !t.is_fallback)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StaticCapability;

    fn cap() -> Arc<dyn Capability> {
        Arc::new(StaticCapability::new("ok"))
    }

    #[test]
    fn test_keywords_are_normalized_and_deduplicated() {
        let d = ToolDescriptor::new("aws", "AWS resources", cap()).with_keywords([
            "EC2 Instances",
            "ec2 instances",
            "S3!",
            "  ",
        ]);
        assert_eq!(d.keywords, vec!["ec2 instances", "s3"]);
    }

    #[test]
    fn test_register_preserves_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::new("b", "", cap()))
            .unwrap();
        registry
            .register(ToolDescriptor::new("a", "", cap()))
            .unwrap();
        assert_eq!(registry.names(), vec!["b", "a"]);
        assert_eq!(registry.index_of("a"), Some(1));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("a", "", cap())).unwrap();
        let err = registry.register(ToolDescriptor::new("a", "", cap())).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("a".to_string()));
    }

    #[test]
    fn test_single_fallback() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::fallback("general", "", cap()))
            .unwrap();
        let err = registry
            .register(ToolDescriptor::fallback("other", "", cap()))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateFallback("general".to_string()));
        assert_eq!(registry.fallback().map(|t| t.name.as_str()), Some("general"));
    }

    #[test]
    fn test_specialized_excludes_fallback() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("a", "", cap())).unwrap();
        registry
            .register(ToolDescriptor::fallback("general", "", cap()))
            .unwrap();
        registry.register(ToolDescriptor::new("b", "", cap())).unwrap();
        let specialized: Vec<(usize, &str)> = registry
            .specialized()
            .map(|(i, t)| (i, t.name.as_str()))
            .collect();
        assert_eq!(specialized, vec![(0, "a"), (2, "b")]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = ToolRegistry::new();
        assert_eq!(
            registry.register(ToolDescriptor::new(" ", "", cap())),
            Err(RegistryError::EmptyName)
        );
    }
}
