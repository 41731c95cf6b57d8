//! Model-to-provider resolution.
//!
//! Given a client-supplied model string, resolution walks a fixed ladder:
//! explicit `provider/model` prefix, declared per-model defaults, the
//! process-wide correction cache, then a live fuzzy search across the
//! fall-through order. The correction cache makes the fuzzy step a
//! once-per-model cost; duplicate concurrent fills are benign because every
//! correct writer computes the same value.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::core::credentials::ApiKeyProvider;
use crate::core::router::ProviderEntry;
use crate::core::types::ModelEntry;
use crate::error::Result;

/// Map from requested model strings to their live-search outcome.
pub(crate) type CorrectionCache = DashMap<String, (String, String)>;

/// A successful routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Registered provider name, lowercase.
    pub provider: String,
    /// Model id to present to that provider.
    pub model: String,
}

impl Resolution {
    fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Resolution {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Resolution steps that need no upstream traffic: prefix, declared
/// defaults, correction cache.
pub(crate) fn resolve_static(
    providers: &HashMap<String, Arc<ProviderEntry>>,
    model_defaults: &HashMap<String, Vec<String>>,
    corrections: &CorrectionCache,
    requested: &str,
) -> Option<Resolution> {
    // Explicit "provider/model" prefix.
    if let Some((prefix, model)) = requested.split_once('/') {
        let prefix = prefix.to_lowercase();
        if providers.contains_key(&prefix) {
            debug!(provider = %prefix, model, "resolved model by explicit prefix");
            return Some(Resolution::new(prefix, model));
        }
        debug!(prefix = %prefix, requested, "prefix does not name a provider, checking defaults");
    }

    // Declared per-model default: first registered candidate wins.
    if let Some(candidates) = model_defaults.get(requested) {
        for candidate in candidates {
            if providers.contains_key(candidate) {
                debug!(provider = %candidate, model = requested, "resolved model by declared default");
                return Some(Resolution::new(candidate.clone(), requested));
            }
            warn!(
                provider = %candidate,
                model = requested,
                "declared default names an unregistered provider"
            );
        }
    }

    // Correction cache from an earlier live search.
    if let Some(hit) = corrections.get(requested) {
        let (provider, model) = hit.value().clone();
        debug!(provider = %provider, model = %model, requested, "resolved model from correction cache");
        return Some(Resolution::new(provider, model));
    }

    None
}

/// Live fuzzy search along the fall-through order.
///
/// A credential failure aborts the whole resolution: it signals an
/// infrastructure problem rather than a miss. A failed catalog fetch only
/// skips that provider.
pub(crate) async fn resolve_live(
    order: &[Arc<ProviderEntry>],
    corrections: &CorrectionCache,
    http: &reqwest::Client,
    keys: &dyn ApiKeyProvider,
    user_id: &str,
    requested: &str,
) -> Result<Option<Resolution>> {
    for entry in order {
        let key = keys
            .api_key(&entry.name, user_id)
            .await
            .map_err(|err| crate::core::handlers::credential_error(&entry.name, err))?;

        let catalog = match entry
            .adapter
            .fetch_models(&entry.base_url, &key, http)
            .await
        {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(provider = %entry.name, %err, "catalog fetch failed during model search, skipping provider");
                continue;
            }
        };

        if let Some(best) = best_match(requested, &catalog) {
            debug!(
                provider = %entry.name,
                requested,
                corrected = %best.id,
                "resolved model by live catalog search"
            );
            corrections.insert(
                requested.to_string(),
                (entry.name.clone(), best.id.clone()),
            );
            return Ok(Some(Resolution::new(entry.name.clone(), best.id.clone())));
        }
    }

    warn!(model = requested, "could not resolve provider for model");
    Ok(None)
}

/// Pick the catalog entry closest to the requested string.
///
/// Candidates must contain the requested string as a substring; among those,
/// the minimum Damerau-Levenshtein distance wins, first-seen on ties.
pub(crate) fn best_match<'a>(requested: &str, catalog: &'a [ModelEntry]) -> Option<&'a ModelEntry> {
    let mut best: Option<(usize, &ModelEntry)> = None;
    for entry in catalog {
        if !entry.id.contains(requested) {
            continue;
        }
        let distance = damerau_levenshtein(requested, &entry.id);
        match best {
            Some((best_distance, _)) if distance >= best_distance => {}
            _ => best = Some((distance, entry)),
        }
    }
    best.map(|(_, entry)| entry)
}

/// Damerau-Levenshtein distance (optimal string alignment), counting
/// insertions, deletions, substitutions and adjacent transpositions.
pub(crate) fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Three rolling rows: two back, one back, current.
    let width = b.len() + 1;
    let mut prev2 = vec![0usize; width];
    let mut prev1: Vec<usize> = (0..width).collect();
    let mut current = vec![0usize; width];

    for i in 1..=a.len() {
        current[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut val = (prev1[j] + 1)
                .min(current[j - 1] + 1)
                .min(prev1[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                val = val.min(prev2[j - 2] + 1);
            }
            current[j] = val;
        }
        std::mem::swap(&mut prev2, &mut prev1);
        std::mem::swap(&mut prev1, &mut current);
    }

    prev1[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderStyle;
    use crate::core::providers::Adapter;
    use url::Url;

    fn entry(name: &str, style: ProviderStyle) -> Arc<ProviderEntry> {
        Arc::new(ProviderEntry {
            name: name.to_string(),
            base_url: Url::parse("https://upstream.example/v1").unwrap(),
            style,
            adapter: Adapter::for_style(style),
        })
    }

    fn registry(names: &[&str]) -> HashMap<String, Arc<ProviderEntry>> {
        names
            .iter()
            .map(|n| (n.to_string(), entry(n, ProviderStyle::OpenAi)))
            .collect()
    }

    #[test]
    fn test_explicit_prefix_resolves_case_insensitively() {
        let providers = registry(&["openai"]);
        let resolution = resolve_static(
            &providers,
            &HashMap::new(),
            &CorrectionCache::new(),
            "OpenAI/gpt-4o",
        )
        .unwrap();
        assert_eq!(resolution, Resolution::new("openai", "gpt-4o"));
    }

    #[test]
    fn test_prefix_splits_once_only() {
        let providers = registry(&["cf"]);
        let resolution = resolve_static(
            &providers,
            &HashMap::new(),
            &CorrectionCache::new(),
            "cf/@cf/meta/llama-3",
        )
        .unwrap();
        assert_eq!(resolution.model, "@cf/meta/llama-3");
    }

    #[test]
    fn test_unknown_prefix_falls_through_to_defaults() {
        let providers = registry(&["anthropic"]);
        let mut defaults = HashMap::new();
        defaults.insert(
            "acme/claude-3".to_string(),
            vec!["anthropic".to_string()],
        );
        let resolution = resolve_static(
            &providers,
            &defaults,
            &CorrectionCache::new(),
            "acme/claude-3",
        )
        .unwrap();
        // The full requested string survives, prefix included.
        assert_eq!(resolution, Resolution::new("anthropic", "acme/claude-3"));
    }

    #[test]
    fn test_declared_default_first_registered_candidate() {
        let providers = registry(&["cloudflare"]);
        let mut defaults = HashMap::new();
        defaults.insert(
            "llama-3".to_string(),
            vec!["missing".to_string(), "cloudflare".to_string()],
        );
        let resolution =
            resolve_static(&providers, &defaults, &CorrectionCache::new(), "llama-3").unwrap();
        assert_eq!(resolution, Resolution::new("cloudflare", "llama-3"));
    }

    #[test]
    fn test_correction_cache_hit() {
        let providers = registry(&["cloudflare"]);
        let corrections = CorrectionCache::new();
        corrections.insert(
            "qwq".to_string(),
            ("cloudflare".to_string(), "@cf/qwen/qwq-32b".to_string()),
        );
        let resolution =
            resolve_static(&providers, &HashMap::new(), &corrections, "qwq").unwrap();
        assert_eq!(
            resolution,
            Resolution::new("cloudflare", "@cf/qwen/qwq-32b")
        );
    }

    #[test]
    fn test_unresolvable_is_none() {
        let providers = registry(&["openai"]);
        assert!(resolve_static(
            &providers,
            &HashMap::new(),
            &CorrectionCache::new(),
            "mystery-model"
        )
        .is_none());
    }

    #[test]
    fn test_distance_counts_transpositions_once() {
        assert_eq!(damerau_levenshtein("ab", "ba"), 1);
        assert_eq!(damerau_levenshtein("qwq", "qqw"), 1);
        assert_eq!(damerau_levenshtein("", "abc"), 3);
        assert_eq!(damerau_levenshtein("kitten", "sitting"), 3);
        assert_eq!(damerau_levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_best_match_requires_substring() {
        let catalog = vec![
            ModelEntry::new("@cf/meta/llama-3", "llama"),
            ModelEntry::new("@cf/qwen/qwq-32b", "qwq"),
        ];
        let best = best_match("qwq", &catalog).unwrap();
        assert_eq!(best.id, "@cf/qwen/qwq-32b");
        assert!(best_match("gpt", &catalog).is_none());
    }

    #[test]
    fn test_best_match_prefers_minimum_distance_first_seen() {
        let catalog = vec![
            ModelEntry::new("gemini-pro-vision", ""),
            ModelEntry::new("gemini-pro", ""),
            ModelEntry::new("x-gemini-pro", ""),
        ];
        // "gemini-pro" is closest to itself; the longer ids lose.
        assert_eq!(best_match("gemini-pro", &catalog).unwrap().id, "gemini-pro");

        // Equal distances: the earlier catalog entry wins.
        let catalog = vec![
            ModelEntry::new("m-aa", ""),
            ModelEntry::new("m-ab", ""),
        ];
        assert_eq!(best_match("m-a", &catalog).unwrap().id, "m-aa");
    }

    struct UnreachableKeys;

    #[async_trait::async_trait]
    impl ApiKeyProvider for UnreachableKeys {
        async fn api_key(
            &self,
            _target: &str,
            _user_id: &str,
        ) -> std::result::Result<String, crate::core::credentials::KeyError> {
            panic!("credential provider must not be consulted on a cache hit");
        }
    }

    #[tokio::test]
    async fn test_cached_resolution_skips_credentials_and_catalogs() {
        let providers = registry(&["cloudflare"]);
        let corrections = CorrectionCache::new();
        corrections.insert(
            "qwq".to_string(),
            ("cloudflare".to_string(), "@cf/qwen/qwq-32b".to_string()),
        );

        // The static ladder answers from cache; the live path (which would
        // consult UnreachableKeys) is never entered.
        let resolution =
            resolve_static(&providers, &HashMap::new(), &corrections, "qwq").unwrap();
        assert_eq!(resolution.provider, "cloudflare");
        let _guard: &dyn ApiKeyProvider = &UnreachableKeys;
    }
}
