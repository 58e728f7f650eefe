//! Turn configured tools into a router registry

use anyhow::{Context, Result};
use std::sync::Arc;
use switchboard_core::{
    Capability, CommandCapability, HttpCapability, StaticCapability, ToolDescriptor, ToolRegistry,
};
use tracing::debug;

use crate::config::{BackendConfig, SwitchboardConfig};

fn capability(backend: &BackendConfig) -> Result<Arc<dyn Capability>> {
    Ok(match backend {
        BackendConfig::Command { program, args } => {
            Arc::new(CommandCapability::new(program.clone(), args.clone()))
        }
        BackendConfig::Http { url, token } => {
            let token = (!token.is_empty()).then(|| token.clone());
            Arc::new(HttpCapability::new(url.clone(), token)?)
        }
        BackendConfig::Static { text } => Arc::new(StaticCapability::new(text.clone())),
    })
}

/// Registry with every configured tool plus exactly one fallback
pub fn build_registry(config: &SwitchboardConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    for tool in &config.tools {
        let cap = capability(&tool.backend)
            .with_context(|| format!("Failed to set up tool '{}'", tool.name))?;
        registry
            .register(
                ToolDescriptor::new(tool.name.clone(), tool.description.clone(), cap)
                    .with_keywords(tool.keywords.iter()),
            )
            .with_context(|| format!("Failed to register tool '{}'", tool.name))?;
        debug!("Registered tool {} ({:?})", tool.name, tool.backend);
    }

    let fallback = match &config.fallback {
        Some(fb) => ToolDescriptor::fallback(
            fb.name.clone(),
            fb.description.clone(),
            capability(&fb.backend)
                .with_context(|| format!("Failed to set up fallback '{}'", fb.name))?,
        ),
        None => ToolDescriptor::fallback(
            "general",
            "Built-in reply when no tool can answer",
            Arc::new(StaticCapability::unknown_answer()),
        ),
    };
    registry
        .register(fallback)
        .context("Failed to register fallback tool")?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FallbackConfig, ToolConfig};

    fn tool(name: &str, keywords: &[&str]) -> ToolConfig {
        ToolConfig {
            name: name.to_string(),
            description: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            backend: BackendConfig::Static {
                text: "ok".to_string(),
            },
        }
    }

    fn config(tools: Vec<ToolConfig>, fallback: Option<FallbackConfig>) -> SwitchboardConfig {
        SwitchboardConfig {
            router: Default::default(),
            tools,
            fallback,
            history: Default::default(),
        }
    }

    #[test]
    fn test_builtin_fallback() {
        let registry = build_registry(&config(vec![tool("aws_resource", &["ec2"])], None)).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.fallback().unwrap().name, "general");
        assert_eq!(registry.get("aws_resource").unwrap().keywords, vec!["ec2"]);
    }

    #[test]
    fn test_configured_fallback() {
        let fb = FallbackConfig {
            name: "chat".to_string(),
            description: String::new(),
            backend: BackendConfig::Command {
                program: "echo".to_string(),
                args: vec![],
            },
        };
        let registry = build_registry(&config(vec![], Some(fb))).unwrap();
        assert_eq!(registry.fallback().unwrap().name, "chat");
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let err = build_registry(&config(vec![tool("a", &["x"]), tool("a", &["y"])], None))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("already registered"));
    }

    #[test]
    fn test_default_config_builds() {
        let cfg: SwitchboardConfig =
            toml::from_str(include_str!("../../../config/default.toml")).unwrap();
        let registry = build_registry(&cfg).unwrap();
        assert!(registry.fallback().is_some());
        assert!(registry.get("aws_resource").is_some());
    }
}
