//! Reverse URL building over registered rules.
//!
//! Candidates for an endpoint are tried most specific first: more placeholders,
//! then more defaults. A rule matches when every placeholder is supplied and no
//! defaulted placeholder is. Leftover parameters become a sorted query string.

use crate::config::MethodSet;
use crate::error::ManagerError;
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlRule {
    pub endpoint: String,
    /// Full path with `{name}` placeholders, prefix included.
    pub path: String,
    pub methods: MethodSet,
    pub defaults: Vec<&'static str>,
}

impl UrlRule {
    pub fn placeholders(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            .collect()
    }

    fn accepts(&self, params: &BTreeMap<String, String>) -> bool {
        self.placeholders().iter().all(|p| params.contains_key(*p))
            && !self.defaults.iter().any(|d| params.contains_key(*d))
    }

    fn render(&self, params: &BTreeMap<String, String>) -> String {
        let mut used = Vec::new();
        let path = self
            .path
            .split('/')
            .map(|seg| {
                match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => {
                        used.push(name);
                        params
                            .get(name)
                            .map(|v| urlencoding::encode(v).into_owned())
                            .unwrap_or_default()
                    }
                    None => seg.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        let extra: Vec<(&str, &str)> = params
            .iter()
            .filter(|(k, _)| !used.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if extra.is_empty() {
            return path;
        }
        match serde_urlencoded::to_string(&extra) {
            Ok(query) => format!("{}?{}", path, query),
            Err(_) => path,
        }
    }
}

/// Builds a URL for `endpoint` from the first matching rule.
pub fn build_url(
    rules: &[UrlRule],
    endpoint: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, ManagerError> {
    let mut candidates: Vec<&UrlRule> = rules
        .iter()
        .filter(|r| r.endpoint == endpoint && !r.methods.is_empty())
        .collect();
    candidates.sort_by_key(|r| (Reverse(r.placeholders().len()), Reverse(r.defaults.len())));
    candidates
        .into_iter()
        .find(|r| r.accepts(params))
        .map(|r| r.render(params))
        .ok_or_else(|| ManagerError::NoMatchingRoute {
            endpoint: endpoint.to_string(),
            params: params.keys().cloned().collect(),
        })
}
