use std::path::Path;

use anyhow::Context;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).context("config variable expansion failed")?;

        let config: Self = toml::from_str(&expanded).context("failed to parse config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is configured, a model pattern is not
    /// a valid regex, or the default model is blank
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.backends.is_empty() {
            anyhow::bail!("at least one backend must be configured under [llm.backends]");
        }

        for (name, backend) in &self.llm.backends {
            for pattern in backend.models.include.iter().chain(&backend.models.exclude) {
                regex::Regex::new(pattern)
                    .with_context(|| format!("invalid model pattern '{pattern}' for backend '{name}'"))?;
            }

            for (model, model_override) in &backend.models.overrides {
                if model_override.alias.as_deref().is_some_and(str::is_empty) {
                    anyhow::bail!("empty alias for model '{model}' on backend '{name}'");
                }
            }
        }

        if self.llm.default_model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            anyhow::bail!("llm.default_model must not be blank");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::{Config, LogFormat, WireFormat};

    const SAMPLE: &str = r#"
[llm]
default_model = "anthropic.claude-3-haiku-20240307-v1:0"
log_confidence = true

[llm.backends.claude]
format = "bedrock_claude"
models.include = ["^anthropic\\."]

[llm.backends.titan]
format = "bedrock_titan"
models.include = ["^amazon\\.titan"]

[llm.backends.openai]
format = "openai"
models.overrides."gpt-4o" = { alias = "smart" }

[telemetry]
log_filter = "debug"
log_format = "json"
"#;

    #[test]
    fn parses_full_config() {
        let config = Config::parse(SAMPLE).unwrap();

        assert!(config.llm.log_confidence);
        assert_eq!(
            config.llm.default_model.as_deref(),
            Some("anthropic.claude-3-haiku-20240307-v1:0")
        );

        let names: Vec<_> = config.llm.backends.keys().map(String::as_str).collect();
        assert_eq!(names, ["claude", "titan", "openai"]);
        assert_eq!(config.llm.backends["claude"].format, WireFormat::BedrockClaude);
        assert_eq!(config.llm.backends["titan"].format, WireFormat::BedrockTitan);
        assert_eq!(
            config.llm.backends["openai"].models.overrides["gpt-4o"].alias.as_deref(),
            Some("smart")
        );

        assert_eq!(config.telemetry.log_filter, "debug");
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn backends_keep_file_order() {
        let raw = r#"
[llm.backends.zeta]
format = "openai"

[llm.backends.alpha]
format = "bedrock_titan"

[llm.backends.mid]
format = "bedrock_claude"
"#;
        let config = Config::parse(raw).unwrap();

        let names: Vec<_> = config.llm.backends.keys().map(String::as_str).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn telemetry_defaults_when_absent() {
        let config = Config::parse("[llm.backends.a]\nformat = \"openai\"\n").unwrap();
        assert_eq!(config.telemetry.log_filter, "info");
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
        assert!(!config.llm.log_confidence);
    }

    #[test]
    fn rejects_empty_backends() {
        let err = Config::parse("[llm]\nlog_confidence = true\n").unwrap_err();
        assert!(err.to_string().contains("at least one backend"));
    }

    #[test]
    fn rejects_invalid_pattern() {
        let raw = "[llm.backends.a]\nformat = \"openai\"\nmodels.include = [\"(unclosed\"]\n";
        let err = Config::parse(raw).unwrap_err();
        assert!(err.to_string().contains("invalid model pattern"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = "[llm.backends.a]\nformat = \"openai\"\nbogus = 1\n";
        assert!(Config::parse(raw).is_err());
    }

    #[test]
    fn rejects_unknown_format() {
        let raw = "[llm.backends.a]\nformat = \"gemini\"\n";
        assert!(Config::parse(raw).is_err());
    }

    #[test]
    fn rejects_blank_default_model() {
        let raw = "[llm]\ndefault_model = \"  \"\n[llm.backends.a]\nformat = \"openai\"\n";
        let err = Config::parse(raw).unwrap_err();
        assert!(err.to_string().contains("default_model"));
    }

    #[test]
    fn load_expands_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[llm]\ndefault_model = \"{{{{ env.CONCORD_TEST_MODEL }}}}\"\n[llm.backends.a]\nformat = \"openai\""
        )
        .unwrap();

        temp_env::with_var("CONCORD_TEST_MODEL", Some("gpt-4o-mini"), || {
            let config = Config::load(file.path()).unwrap();
            assert_eq!(config.llm.default_model.as_deref(), Some("gpt-4o-mini"));
        });
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(std::path::Path::new("/nonexistent/concord.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
