//! Convention-based request classification
//!
//! Derives {biz_type, operation_type, data_id} from (method, path) alone.
//! CRUD endpoints are added to the CMS continuously; a convention-based
//! classifier means none of them has to register with the audit system.
//!
//! Classification order:
//! 1. cache lookup (hits and remembered misses)
//! 2. structural decomposition `/{prefix}/{bizSegment}/{actionPath...}`
//!    against the known prefix conventions, most-specific first
//! 3. an ordered, first-match-wins action rule table
//! 4. a literal whole-path fallback table for routes the grammar cannot
//!    express

use http::Method;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::cache::ClassificationCache;
use super::models::{Classification, OperationType};

/// Prefix conventions, most-specific first. The empty prefix must stay
/// last: it matches everything.
const PATH_PREFIXES: &[&str] = &["/prod-api/cms", "/prod-api", "/cms", ""];

/// Domain token for file actions whose path does not name the resource.
const FILE_BIZ_TYPE: &str = "biz_file";

const TEMPLATE_BIZ_TYPE: &str = "biz_template";

/// Single-segment actions that fix both the operation and the biz type,
/// regardless of the path's biz segment.
const FIXED_ACTIONS: &[(&str, &str, OperationType)] =
    &[("upload", FILE_BIZ_TYPE, OperationType::Upload)];

/// Whole-path routes outside the generic grammar. Patterns are anchored
/// and fully literal apart from the optional prefixes.
struct LiteralRoute {
    pattern: &'static str,
    biz_type: &'static str,
    operation: OperationType,
}

const LITERAL_ROUTES: &[LiteralRoute] = &[
    LiteralRoute {
        pattern: r"^(?:/prod-api)?(?:/cms)?/file/generate$",
        biz_type: FILE_BIZ_TYPE,
        operation: OperationType::Generate,
    },
    LiteralRoute {
        pattern: r"^(?:/prod-api)?(?:/cms)?/template/copy$",
        biz_type: TEMPLATE_BIZ_TYPE,
        operation: OperationType::Add,
    },
];

/// Path classifier backed by the bounded classification cache.
///
/// Deterministic for identical (method, path): the cache is shared mutable
/// state but only ever stores what recomputation would produce anyway.
pub struct PathClassifier {
    cache: Arc<ClassificationCache>,
}

impl PathClassifier {
    pub fn new(cache: Arc<ClassificationCache>) -> Self {
        Self { cache }
    }

    /// Classify a request path. `None` means "nothing to record".
    ///
    /// `path` should be the original full URL when a proxy may have
    /// rewritten the routing path; query strings and trailing slashes are
    /// ignored either way.
    pub fn classify(&self, method: &Method, path: &str) -> Option<Classification> {
        let normalized = normalize_path(path);
        if let Some(cached) = self.cache.get(method, &normalized) {
            return cached;
        }

        let outcome = classify_path(method, &normalized);
        self.cache.put(method.clone(), normalized, outcome.clone());
        outcome
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn classify_path(method: &Method, path: &str) -> Option<Classification> {
    classify_structural(method, path).or_else(|| classify_literal(path))
}

fn classify_structural(method: &Method, path: &str) -> Option<Classification> {
    for prefix in PATH_PREFIXES {
        let Some(rest) = path.strip_prefix(prefix) else {
            continue;
        };
        if !rest.starts_with('/') {
            continue;
        }

        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let [biz_segment, action @ ..] = segments.as_slice() else {
            continue;
        };
        if action.is_empty() {
            continue;
        }

        // A prefix that decomposes but yields no recognized action falls
        // through to the next convention.
        let Some(matched) = classify_action(method, action) else {
            continue;
        };

        let biz_type = matched
            .biz_override
            .unwrap_or_else(|| biz_token(biz_segment));
        return Some(Classification {
            biz_type,
            operation_type: matched.operation,
            data_id: matched.data_id,
        });
    }
    None
}

/// What a single action rule produced.
struct ActionMatch {
    operation: OperationType,
    data_id: Option<i64>,
    biz_override: Option<String>,
}

impl ActionMatch {
    fn op(operation: OperationType) -> Self {
        Self {
            operation,
            data_id: None,
            biz_override: None,
        }
    }
}

type ActionRule = fn(&Method, &[&str]) -> Option<ActionMatch>;

/// First match wins; rule order is semantically significant. New endpoint
/// conventions are new entries here, not new control flow.
const ACTION_RULES: &[ActionRule] = &[
    rule_save,
    rule_add,
    rule_numeric_id,
    rule_del,
    rule_toggle,
    rule_sort,
    rule_settings_save,
    rule_fixed_action,
];

fn classify_action(method: &Method, action: &[&str]) -> Option<ActionMatch> {
    ACTION_RULES.iter().find_map(|rule| rule(method, action))
}

fn rule_save(_: &Method, action: &[&str]) -> Option<ActionMatch> {
    matches!(action, ["save"]).then(|| ActionMatch::op(OperationType::Save))
}

fn rule_add(_: &Method, action: &[&str]) -> Option<ActionMatch> {
    matches!(action, ["add"] | ["register"]).then(|| ActionMatch::op(OperationType::Add))
}

/// A purely numeric segment is a REST-style id: PUT updates it, anything
/// else deletes it. The id itself is captured either way.
fn rule_numeric_id(method: &Method, action: &[&str]) -> Option<ActionMatch> {
    let [segment] = action else { return None };
    let data_id = parse_numeric_segment(segment)?;
    let operation = if *method == Method::PUT {
        OperationType::Update
    } else {
        OperationType::Delete
    };
    Some(ActionMatch {
        operation,
        data_id: Some(data_id),
        biz_override: None,
    })
}

fn rule_del(_: &Method, action: &[&str]) -> Option<ActionMatch> {
    matches!(action, ["del"]).then(|| ActionMatch::op(OperationType::Delete))
}

fn rule_toggle(_: &Method, action: &[&str]) -> Option<ActionMatch> {
    match action {
        ["enable"] => Some(ActionMatch::op(OperationType::Enable)),
        ["disable"] => Some(ActionMatch::op(OperationType::Disable)),
        _ => None,
    }
}

fn rule_sort(_: &Method, action: &[&str]) -> Option<ActionMatch> {
    matches!(action, ["sort"]).then(|| ActionMatch::op(OperationType::Update))
}

/// `{settingsName}/save` saves a named settings blob; the decoded settings
/// name, not the path's biz segment, is the affected resource.
fn rule_settings_save(_: &Method, action: &[&str]) -> Option<ActionMatch> {
    let [name, "save"] = action else { return None };
    let decoded = percent_decode_str(name).decode_utf8().ok()?;
    if decoded.is_empty() {
        return None;
    }
    Some(ActionMatch {
        operation: OperationType::Save,
        data_id: None,
        biz_override: Some(biz_token(&decoded)),
    })
}

fn rule_fixed_action(_: &Method, action: &[&str]) -> Option<ActionMatch> {
    let [single] = action else { return None };
    FIXED_ACTIONS
        .iter()
        .find(|(name, _, _)| name == single)
        .map(|(_, biz_type, operation)| ActionMatch {
            operation: *operation,
            data_id: None,
            biz_override: Some(biz_type.to_string()),
        })
}

fn classify_literal(path: &str) -> Option<Classification> {
    literal_regexes()
        .iter()
        .zip(LITERAL_ROUTES)
        .find(|(regex, _)| regex.is_match(path))
        .map(|(_, route)| Classification {
            biz_type: route.biz_type.to_string(),
            operation_type: route.operation,
            data_id: None,
        })
}

fn literal_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        LITERAL_ROUTES
            .iter()
            .map(|route| Regex::new(route.pattern).expect("literal route pattern is valid"))
            .collect()
    })
}

fn parse_numeric_segment(segment: &str) -> Option<i64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// camelCase biz segment to its domain token: "programTemplate" ->
/// "biz_program_template".
fn biz_token(segment: &str) -> String {
    let mut token = String::with_capacity(segment.len() + 8);
    token.push_str("biz_");
    for (i, ch) in segment.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                token.push('_');
            }
            token.push(ch.to_ascii_lowercase());
        } else {
            token.push(ch);
        }
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn classifier() -> PathClassifier {
        PathClassifier::new(Arc::new(ClassificationCache::default()))
    }

    #[test]
    fn test_save_action() {
        let c = classifier().classify(&Method::POST, "/cms/sound/save").unwrap();
        assert_eq!(c.biz_type, "biz_sound");
        assert_eq!(c.operation_type, OperationType::Save);
        assert_eq!(c.data_id, None);
    }

    #[test]
    fn test_gateway_prefix() {
        let c = classifier()
            .classify(&Method::POST, "/prod-api/cms/exercise/add")
            .unwrap();
        assert_eq!(c.biz_type, "biz_exercise");
        assert_eq!(c.operation_type, OperationType::Add);
    }

    #[test]
    fn test_no_prefix() {
        let c = classifier().classify(&Method::POST, "/workout/del").unwrap();
        assert_eq!(c.biz_type, "biz_workout");
        assert_eq!(c.operation_type, OperationType::Delete);
    }

    #[test]
    fn test_camel_case_biz_segment() {
        let c = classifier()
            .classify(&Method::POST, "/cms/programTemplate/save")
            .unwrap();
        assert_eq!(c.biz_type, "biz_program_template");
    }

    #[test]
    fn test_numeric_segment_put_is_update() {
        let c = classifier().classify(&Method::PUT, "/cms/sound/123").unwrap();
        assert_eq!(c.operation_type, OperationType::Update);
        assert_eq!(c.data_id, Some(123));
    }

    #[test]
    fn test_numeric_segment_other_method_is_delete() {
        let c = classifier()
            .classify(&Method::DELETE, "/cms/sound/123")
            .unwrap();
        assert_eq!(c.operation_type, OperationType::Delete);
        assert_eq!(c.data_id, Some(123));
    }

    #[test]
    fn test_register_is_add() {
        let c = classifier().classify(&Method::POST, "/cms/user/register").unwrap();
        assert_eq!(c.biz_type, "biz_user");
        assert_eq!(c.operation_type, OperationType::Add);
    }

    #[test]
    fn test_enable_disable_sort() {
        let c = classifier();
        assert_eq!(
            c.classify(&Method::POST, "/cms/program/enable").unwrap().operation_type,
            OperationType::Enable
        );
        assert_eq!(
            c.classify(&Method::POST, "/cms/program/disable").unwrap().operation_type,
            OperationType::Disable
        );
        assert_eq!(
            c.classify(&Method::POST, "/cms/category/sort").unwrap().operation_type,
            OperationType::Update
        );
    }

    #[test]
    fn test_settings_save_overrides_biz_type() {
        let c = classifier()
            .classify(&Method::POST, "/cms/settings/notificationConfig/save")
            .unwrap();
        assert_eq!(c.biz_type, "biz_notification_config");
        assert_eq!(c.operation_type, OperationType::Save);
    }

    #[test]
    fn test_settings_save_percent_decoded() {
        // %43 is 'C': the decoded settings name drives the token.
        let c = classifier()
            .classify(&Method::POST, "/cms/settings/push%43onfig/save")
            .unwrap();
        assert_eq!(c.biz_type, "biz_push_config");
    }

    #[test]
    fn test_upload_overrides_biz_type() {
        let c = classifier().classify(&Method::POST, "/cms/exercise/upload").unwrap();
        assert_eq!(c.biz_type, "biz_file");
        assert_eq!(c.operation_type, OperationType::Upload);
    }

    #[test]
    fn test_literal_fallback_generate() {
        let c = classifier().classify(&Method::POST, "/cms/file/generate").unwrap();
        assert_eq!(c.biz_type, "biz_file");
        assert_eq!(c.operation_type, OperationType::Generate);
    }

    #[test]
    fn test_literal_fallback_template_copy() {
        let c = classifier()
            .classify(&Method::POST, "/prod-api/cms/template/copy")
            .unwrap();
        assert_eq!(c.biz_type, "biz_template");
        assert_eq!(c.operation_type, OperationType::Add);
    }

    #[test]
    fn test_query_string_and_trailing_slash_ignored() {
        let c = classifier();
        let with_query = c.classify(&Method::POST, "/cms/sound/save?lang=en").unwrap();
        let with_slash = c.classify(&Method::POST, "/cms/sound/save/").unwrap();
        assert_eq!(with_query, with_slash);
    }

    #[test]
    fn test_unclassifiable_path() {
        let c = classifier();
        assert!(c.classify(&Method::POST, "/cms/sound/transcode").is_none());
        assert!(c.classify(&Method::POST, "/").is_none());
    }

    #[test]
    fn test_determinism_and_cache_coherence() {
        let c = classifier();
        let first = c.classify(&Method::PUT, "/cms/sound/42");
        let second = c.classify(&Method::PUT, "/cms/sound/42");
        assert_eq!(first, second);

        // Clearing the cache changes latency only, never the outcome.
        c.cache().clear();
        let third = c.classify(&Method::PUT, "/cms/sound/42");
        assert_eq!(first, third);
    }

    #[test]
    fn test_miss_is_cached() {
        let c = classifier();
        assert!(c.classify(&Method::POST, "/nothing/here/at-all").is_none());
        assert!(c
            .cache()
            .get(&Method::POST, "/nothing/here/at-all")
            .is_some_and(|cached| cached.is_none()));
    }

    #[test]
    fn test_numeric_id_contract() {
        // data_id is non-null only when the path itself encoded an id.
        let c = classifier();
        assert_eq!(c.classify(&Method::POST, "/cms/sound/save").unwrap().data_id, None);
        assert_eq!(c.classify(&Method::POST, "/cms/sound/del").unwrap().data_id, None);
        assert_eq!(
            c.classify(&Method::PUT, "/cms/sound/7").unwrap().data_id,
            Some(7)
        );
    }
}
