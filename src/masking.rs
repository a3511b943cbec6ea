use regex::Regex;

use crate::config::{MaskRule, MaskingConfig};
use crate::error::{Result, SumoSearchError};

/// 文本脱敏策略。实现必须是全函数：任何输入都返回字符串，空串返回空串，
/// 对已脱敏文本再次处理不会产生额外破坏。
pub trait Masker: Send + Sync {
    fn mask(&self, text: &str) -> String;
}

impl<F> Masker for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn mask(&self, text: &str) -> String {
        self(text)
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    regex: Regex,
    replacement: String,
}

/// Regex-driven masker. Rules run in order over the whole text.
#[derive(Debug, Clone)]
pub struct PatternMasker {
    rules: Vec<CompiledRule>,
}

const PLACEHOLDER_TOKEN: &str = "{placeholder}";

impl PatternMasker {
    pub fn from_config(config: &MaskingConfig) -> Result<Self> {
        let rules = if config.rules.is_empty() {
            default_rules()
        } else {
            config.rules.clone()
        };
        Self::with_rules(&rules, &config.placeholder)
    }

    pub fn with_rules(rules: &[MaskRule], placeholder: &str) -> Result<Self> {
        // `$` 在替换串中有特殊含义
        let placeholder = placeholder.replace('$', "$$");
        let compiled = rules
            .iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).map_err(|e| SumoSearchError::RegexError {
                    pattern: rule.pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok(CompiledRule {
                    name: rule.name.clone(),
                    regex,
                    replacement: rule.replacement.replace(PLACEHOLDER_TOKEN, &placeholder),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules: compiled })
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }
}

impl Default for PatternMasker {
    fn default() -> Self {
        Self::from_config(&MaskingConfig::default())
            .expect("built-in masking rules are valid")
    }
}

impl Masker for PatternMasker {
    fn mask(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            if rule.regex.is_match(&out) {
                out = rule
                    .regex
                    .replace_all(&out, rule.replacement.as_str())
                    .into_owned();
            }
        }
        out
    }
}

fn rule(name: &str, pattern: &str, replacement: &str) -> MaskRule {
    MaskRule {
        name: name.to_string(),
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
    }
}

/// 内置规则：凭据、令牌、邮箱。
pub fn default_rules() -> Vec<MaskRule> {
    vec![
        rule(
            "bearer_token",
            r"(?i)(\bbearer\s+)[A-Za-z0-9\-._~+/]+=*",
            "${1}{placeholder}",
        ),
        rule(
            "url_credentials",
            r"(://[^/\s:@]+:)[^@\s/]+@",
            "${1}{placeholder}@",
        ),
        rule(
            "key_value_secret",
            r#"(?i)(\b(?:access[_-]?token|refresh[_-]?token|token|api[_-]?key|apikey|client[_-]?secret|secret|password|passwd|pwd|access[_-]?key)\b["']?\s*[:=]\s*["']?)[^\s"'&,;]+"#,
            "${1}{placeholder}",
        ),
        rule(
            "jwt",
            r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+",
            "{placeholder}",
        ),
        rule("aws_access_key_id", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b", "{placeholder}"),
        rule(
            "email",
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            "{placeholder}",
        ),
    ]
}
