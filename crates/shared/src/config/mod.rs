// Configuration - INI-style file with environment variable overrides
//
// Constructed once in the bootstrap and passed by reference; there is no
// process-global instance. An environment variable named
// `<prefix><Key>` (dots replaced by underscores) overrides the file.

use std::collections::HashMap;
use std::path::Path;

pub struct Config {
    values: HashMap<String, String>,
    env_prefix: String,
}

impl Config {
    /// Load `filename`, returning `None` when the file cannot be read.
    pub fn load(filename: &str, env_prefix: &str) -> Option<Self> {
        let content = std::fs::read_to_string(Path::new(filename)).ok()?;
        let mut values = HashMap::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            // Section headers are accepted but carry no meaning.
            if trimmed.starts_with('[') {
                continue;
            }

            if let Some(eq_pos) = trimmed.find('=') {
                let key = trimmed[..eq_pos].trim().to_string();
                let mut value = trimmed[eq_pos + 1..].trim().to_string();
                if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
                    value = value[1..value.len() - 1].to_string();
                }
                values.insert(key, value);
            }
        }

        Some(Config {
            values,
            env_prefix: env_prefix.to_string(),
        })
    }

    /// An empty configuration: every lookup yields its default.
    pub fn empty(env_prefix: &str) -> Self {
        Config {
            values: HashMap::new(),
            env_prefix: env_prefix.to_string(),
        }
    }

    pub fn get_string_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_string_default(key, "")
    }

    pub fn get_int_default(&self, key: &str, default: i32) -> i32 {
        match self.get(key) {
            Some(val) => val.parse().unwrap_or(default),
            None => default,
        }
    }

    pub fn get_bool_default(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes"),
            None => default,
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        if !self.env_prefix.is_empty() {
            let env_key = format!("{}{}", self.env_prefix, key.replace('.', "_"));
            if let Ok(val) = std::env::var(&env_key) {
                return Some(val);
            }
        }
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::empty("Test_");
        assert_eq!(config.get_int_default("MissingPort", 3724), 3724);
        assert_eq!(config.get_string_default("MissingHost", "0.0.0.0"), "0.0.0.0");
        assert!(config.get_bool_default("MissingFlag", true));
    }

    #[test]
    fn parses_ini_content() {
        let dir = std::env::temp_dir().join("logond-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.conf");
        std::fs::write(
            &path,
            "# comment\n[Section]\nBindIP = \"127.0.0.1\"\nLogonServerPort = 3725\nEnabled = yes\n",
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap(), "").unwrap();
        assert_eq!(config.get_string("BindIP"), "127.0.0.1");
        assert_eq!(config.get_int_default("LogonServerPort", 0), 3725);
        assert!(config.get_bool_default("Enabled", false));
    }

    #[test]
    fn missing_file_is_none() {
        assert!(Config::load("/nonexistent/logond.conf", "").is_none());
    }
}
