use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Well-known keys written by the built-in wizard steps
pub mod keys {
    pub const SERVICE_ID: &str = "serviceId";
    pub const AVAILABLE_ENDPOINTS: &str = "availableEndpoints";
    pub const SELECTED_ENDPOINTS: &str = "selectedEndpoints";
    pub const SUITE_NAME: &str = "suiteName";
    pub const SUITE_DESCRIPTION: &str = "suiteDescription";
    pub const GENERATION_INSTRUCTIONS: &str = "generationInstructions";
    pub const TEST_SUITE_ID: &str = "testSuiteId";
    pub const GENERATED_TEST_CASES: &str = "generatedTestCases";
    pub const RUN_ID: &str = "runId";
    pub const RUN_RESULT: &str = "runResult";
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // ${key} where key can contain dots
    PATTERN.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").expect("placeholder pattern"))
}

/// Root names of every `${...}` placeholder in `text`, in order of appearance
pub fn placeholder_roots(text: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(text)
        .map(|caps| {
            let key = &caps[1];
            key.split('.').next().unwrap_or(key).to_string()
        })
        .collect()
}

/// Key/value bag carried across wizard steps and mode switches.
///
/// Writes are unconditional and last-write-wins. There is no delete: a
/// later step may rely on any key an earlier step set. An absent key means
/// "not available yet", so readers get an `Option` and decide for themselves.
#[derive(Debug, Clone, Default)]
pub struct SharedContextStore {
    values: BTreeMap<String, Value>,
}

impl SharedContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        log::debug!("context: {} = {}", key, value);
        self.values.insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// True when the key is set to something other than null, "" or []
    pub fn is_filled(&self, key: &str) -> bool {
        match self.values.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Decode a stored value into a typed shape. `None` when absent,
    /// `Some(Err)` when present but the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<serde_json::Result<T>> {
        self.values
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
    }

    /// Store any serializable value
    pub fn set_json<T: serde::Serialize>(&mut self, key: &str, value: &T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up `name` or `name.json.path` (dot path into a stored object)
    pub fn lookup_path(&self, full_key: &str) -> Option<Value> {
        if let Some(v) = self.values.get(full_key) {
            return Some(v.clone());
        }

        let (name, path) = full_key.split_once('.')?;
        let root = self.values.get(name)?;
        // A string holding JSON is traversed as if it were the object itself
        let parsed;
        let root = match root {
            Value::String(s) => {
                parsed = serde_json::from_str::<Value>(s).ok()?;
                &parsed
            }
            other => other,
        };
        let pointer = format!("/{}", path.replace('.', "/"));
        root.pointer(&pointer).cloned()
    }

    /// Substitute `${key}` or `${key.json.path}` placeholders. Unknown keys
    /// are left as written.
    pub fn substitute(&self, text: &str) -> String {
        placeholder_pattern()
            .replace_all(text, |caps: &regex::Captures| {
                let full_key = &caps[1];
                match self.lookup_path(full_key) {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => format!("${{{}}}", full_key),
                }
            })
            .to_string()
    }

    /// Merge values produced elsewhere (e.g. extracted from a step response)
    pub fn merge(&mut self, values: &BTreeMap<String, Value>) {
        for (k, v) in values {
            self.set(k, v.clone());
        }
    }
}
