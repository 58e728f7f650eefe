use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchboard_core::RouterConfig;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    /// General-purpose tool used when no specialized tool is accepted.
    /// Without one, a built-in honest "can't answer" reply is used.
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_name")]
    pub name: String,
    #[serde(default = "default_fallback_description")]
    pub description: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

fn default_fallback_name() -> String {
    "general".to_string()
}

fn default_fallback_description() -> String {
    "General questions and anything no specialized tool covers".to_string()
}

/// How a tool is reached
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Local program; `{query}` in `args` is replaced by the request text
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Agent service reached over HTTP
    Http {
        url: String,
        #[serde(default)]
        token: String,
    },
    /// Fixed reply, mostly useful as a fallback
    Static { text: String },
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command { program, args } => f
                .debug_struct("Command")
                .field("program", program)
                .field("args", args)
                .finish(),
            Self::Http { url, token } => f
                .debug_struct("Http")
                .field("url", url)
                .field("token", &mask_secret(token))
                .finish(),
            Self::Static { text } => f.debug_struct("Static").field("text", text).finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
        }
    }
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

fn default_true() -> bool {
    true
}

fn default_history_path() -> String {
    "~/.switchboard/routing_history.json".to_string()
}

/// Mask a secret for Debug output: first 3 and last 4 chars when long
/// enough, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
}

impl SwitchboardConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // Tool tokens may live in this file
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    warn!(
                        "Config file {} is readable by other users ({:o}); consider chmod 600",
                        path.display(),
                        mode & 0o777
                    );
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `switchboard init` first.",
                path.display()
            )
        })?;
        Self::parse(&content, &path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok());
        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        for name in config.hardcoded_tokens(content) {
            warn!(
                "Token for tool '{}' is hardcoded in config file. \
                 Prefer token = \"${{SWITCHBOARD_AGENT_TOKEN}}\"",
                name
            );
        }
        for tool in &config.tools {
            if tool.keywords.is_empty() {
                warn!("Tool '{}' has no keywords and can never be matched", tool.name);
            }
        }

        Ok(config)
    }

    /// Names of tools, fallback included, whose HTTP token appears literally
    /// in the unexpanded config text
    fn hardcoded_tokens(&self, raw: &str) -> Vec<&str> {
        let backends = self
            .tools
            .iter()
            .map(|t| (t.name.as_str(), &t.backend))
            .chain(self.fallback.iter().map(|f| (f.name.as_str(), &f.backend)));
        backends
            .filter_map(|(name, backend)| match backend {
                BackendConfig::Http { token, .. }
                    if !token.is_empty() && raw.contains(&format!("\"{}\"", token)) =>
                {
                    Some(name)
                }
                _ => None,
            })
            .collect()
    }

    /// Copy with tool tokens masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let backends = copy
            .tools
            .iter_mut()
            .map(|t| &mut t.backend)
            .chain(copy.fallback.iter_mut().map(|f| &mut f.backend));
        for backend in backends {
            if let BackendConfig::Http { token, .. } = backend {
                *token = mask_secret(token);
            }
        }
        copy
    }
}

/// Environment variables that may be expanded in config files. Anything
/// else is left as a literal `${NAME}`.
const ALLOWED_ENV_VARS: &[&str] = &[
    "SWITCHBOARD_AGENT_TOKEN",
    "SWITCHBOARD_AGENT_URL",
    "AWS_PROFILE",
    "AWS_REGION",
    "HOME",
    "USER",
];

/// Replace allowlisted `${NAME}` references using `lookup`. Unset variables
/// expand to the empty string.
fn expand_env_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + len];
        out.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&name) {
            out.push_str(&lookup(name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                name
            );
            out.push_str(&rest[start..start + len + 1]);
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(s: &str) -> PathBuf {
    match s.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SWITCHBOARD_AGENT_TOKEN" => Some("tok-123".to_string()),
            "PATH" => Some("/usr/bin".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_parse_default_config() {
        let content = include_str!("../../../config/default.toml");
        let config = SwitchboardConfig::parse(content, Path::new("default.toml")).unwrap();
        assert!(!config.tools.is_empty());
        assert!(config.tools.iter().any(|t| t.name == "aws_resource"));
        assert!(config.fallback.is_some());
        assert!(config.history.enabled);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = SwitchboardConfig::parse("", Path::new("x.toml")).unwrap();
        assert!(config.tools.is_empty());
        assert!(config.fallback.is_none());
        assert_eq!(config.router.viability_threshold, 0.3);
        assert_eq!(config.router.tool_timeout_secs, 30);
    }

    #[test]
    fn test_tool_backends() {
        let content = r#"
[router]
viability_threshold = 0.4

[[tools]]
name = "aws_resource"
keywords = ["ec2 instances", "s3 buckets"]
kind = "command"
program = "aws-agent"
args = ["--query", "{query}"]

[[tools]]
name = "network"
kind = "http"
url = "http://localhost:8080/ask"
keywords = ["dns"]

[fallback]
kind = "static"
text = "No idea."
"#;
        let config = SwitchboardConfig::parse(content, Path::new("x.toml")).unwrap();
        assert_eq!(config.router.viability_threshold, 0.4);
        match &config.tools[0].backend {
            BackendConfig::Command { program, args } => {
                assert_eq!(program, "aws-agent");
                assert_eq!(args[1], "{query}");
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert!(matches!(
            &config.tools[1].backend,
            BackendConfig::Http { token, .. } if token.is_empty()
        ));
        let fallback = config.fallback.unwrap();
        assert_eq!(fallback.name, "general");
        assert!(matches!(fallback.backend, BackendConfig::Static { .. }));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let content = r#"
[[tools]]
name = "x"
kind = "carrier_pigeon"
"#;
        assert!(SwitchboardConfig::parse(content, Path::new("x.toml")).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        assert_eq!(
            expand_env_vars("token = \"${SWITCHBOARD_AGENT_TOKEN}\"", lookup),
            "token = \"tok-123\""
        );
        // Allowed but unset
        assert_eq!(expand_env_vars("${AWS_REGION}/x", lookup), "/x");
        // Not allowlisted: left alone
        assert_eq!(expand_env_vars("${PATH}", lookup), "${PATH}");
        assert_eq!(expand_env_vars("a ${HOME", lookup), "a ${HOME");
        assert_eq!(expand_env_vars("no vars", lookup), "no vars");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("abcdefghijkl"), "abc...ijkl");
        let backend = BackendConfig::Http {
            url: "http://x".to_string(),
            token: "supersecrettoken".to_string(),
        };
        assert!(!format!("{:?}", backend).contains("supersecrettoken"));
    }

    #[test]
    fn test_redacted_hides_tokens() {
        let content = r#"
[[tools]]
name = "aws_resource"
keywords = ["ec2"]
kind = "http"
url = "http://localhost:8101/ask"
token = "${SWITCHBOARD_AGENT_TOKEN}"

[fallback]
kind = "http"
url = "http://localhost:8103/ask"
token = "plain-fallback-token"
"#;
        let config: SwitchboardConfig =
            toml::from_str(&expand_env_vars(content, |_| Some("agent-secret-token".to_string())))
                .unwrap();
        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("agent-secret-token"));
        assert!(!shown.contains("plain-fallback-token"));
        assert!(shown.contains("age...oken"));
    }

    #[test]
    fn test_hardcoded_tokens_include_fallback() {
        let content = r#"
[[tools]]
name = "aws_resource"
keywords = ["ec2"]
kind = "http"
url = "http://localhost:8101/ask"
token = "${SWITCHBOARD_AGENT_TOKEN}"

[fallback]
kind = "http"
url = "http://localhost:8103/ask"
token = "plain-fallback-token"
"#;
        let expanded = expand_env_vars(content, |_| Some("from-env-token".to_string()));
        let config: SwitchboardConfig = toml::from_str(&expanded).unwrap();
        assert_eq!(config.hardcoded_tokens(content), vec!["general"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SwitchboardConfig::load(&Some(dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("switchboard init"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/h.json"), PathBuf::from("/tmp/h.json"));
        assert!(expand_home("~/h.json").ends_with("h.json"));
    }
}
