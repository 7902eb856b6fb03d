//! Resource templates: typed URI templates that render canonical entry paths.
//!
//! A versioned template such as `docs://api/{version}/{page}` renders its
//! canonical path with the version slot removed and the normalized version
//! appended after `~`:
//!
//! ```text
//! docs://api/v1.2.0/endpoint  ->  docs://api/endpoint~1.2.0
//! ```
//!
//! Both spellings are accepted when extracting parameters, so
//! `extract_parameters(render_path(p)) == p` holds for every valid `p`.

use std::collections::BTreeMap;

use tracing::debug;

use docpipe_shared::{DocpipeError, Result, TemplateConfig, VERSION_SEPARATOR};

use crate::index::EntryIndex;
use crate::uri::{
    ParamType, ParamValue, ParameterSet, ParameterTypes, RawParameters, UriTemplate,
    validate_parameters,
};
use crate::version::{Version, normalize, resolve_inheritance};

/// An immutable URI template with typed parameters.
#[derive(Debug, Clone)]
pub struct ResourceTemplate {
    uri: UriTemplate,
    parameter_types: ParameterTypes,
    /// Name of the `version`-typed slot, if any.
    version_param: Option<String>,
    /// `uri` without the version slot; what canonical paths are built from.
    base: Option<UriTemplate>,
    /// Fixed version for templates without a version slot.
    version: Option<Version>,
    release: Option<String>,
}

impl ResourceTemplate {
    /// Parse `template` and check it against `parameter_types`.
    pub fn new(template: &str, parameter_types: ParameterTypes) -> Result<Self> {
        let uri = UriTemplate::parse(template)?;
        let invalid = |reason: String| DocpipeError::InvalidTemplate {
            template: template.to_string(),
            reason,
        };

        for slot in uri.slots() {
            if !parameter_types.contains_key(slot) {
                return Err(invalid(format!("slot {slot:?} has no declared type")));
            }
        }
        for name in parameter_types.keys() {
            if !uri.slots().any(|slot| slot == name.as_str()) {
                return Err(invalid(format!("declared parameter {name:?} has no slot")));
            }
        }

        let mut version_slots = parameter_types
            .iter()
            .filter(|(_, ty)| **ty == ParamType::Version)
            .map(|(name, _)| name.clone());
        let version_param = version_slots.next();
        if version_slots.next().is_some() {
            return Err(invalid("more than one version parameter".into()));
        }

        let base = version_param
            .as_deref()
            .map(|name| uri.without_slot(name))
            .transpose()?;

        Ok(Self {
            uri,
            parameter_types,
            version_param,
            base,
            version: None,
            release: None,
        })
    }

    /// Build from a `[[templates]]` config entry.
    pub fn from_config(config: &TemplateConfig) -> Result<Self> {
        let types = config
            .params
            .iter()
            .map(|(name, ty)| -> Result<(String, ParamType)> { Ok((name.clone(), ty.parse()?)) })
            .collect::<Result<ParameterTypes>>()?;

        let mut template = Self::new(&config.uri, types)?;
        if let Some(version) = &config.version {
            template = template.with_version(version);
        }
        if let Some(release) = &config.release {
            template = template.with_release(release.clone());
        }
        Ok(template)
    }

    /// Qualify every rendered path with a fixed version. Ignored for
    /// templates that have a version slot.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(normalize(version));
        self
    }

    /// Attach a release label copied into entry metadata.
    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn template(&self) -> &str {
        self.uri.as_str()
    }

    pub fn parameter_types(&self) -> &ParameterTypes {
        &self.parameter_types
    }

    pub fn version_param(&self) -> Option<&str> {
        self.version_param.as_deref()
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    /// The version an entry rendered from `params` is qualified with.
    pub fn version_of<'a>(&'a self, params: &'a ParameterSet) -> Option<&'a Version> {
        match &self.version_param {
            Some(name) => params.get(name).and_then(ParamValue::as_version),
            None => self.version.as_ref(),
        }
    }

    // -----------------------------------------------------------------------
    // Extraction
    // -----------------------------------------------------------------------

    /// Match `uri` (expanded or canonical form) and type-check its parameters.
    pub fn extract_parameters(&self, uri: &str) -> Result<ParameterSet> {
        let raw = self.extract_raw(uri)?;
        validate_parameters(&self.parameter_types, &raw)
    }

    fn extract_raw(&self, uri: &str) -> Result<RawParameters> {
        let mismatch = |reason: &str| DocpipeError::TemplateMismatch {
            template: self.uri.as_str().to_string(),
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let suffix = split_version_suffix(uri);

        match (&self.version_param, &self.base, suffix) {
            // Canonical form of a versioned template.
            (Some(name), Some(base), Some((head, version))) => {
                let mut raw = base.extract(head)?;
                raw.insert(name.clone(), version.to_string());
                Ok(raw)
            }
            (Some(_), _, None) => self.uri.extract(uri),
            // Fixed-version template, qualified spelling.
            (None, _, Some((head, version))) => match &self.version {
                Some(fixed) if *fixed == normalize(version) => self.uri.extract(head),
                Some(_) => Err(mismatch("version does not match the template's version")),
                None => Err(mismatch("template is not versioned")),
            },
            (None, _, None) => self.uri.extract(uri),
            (Some(_), None, Some(_)) => Err(mismatch("template has no base path")),
        }
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Render the canonical, version-qualified path for `params`.
    pub fn render_path(&self, params: &ParameterSet) -> Result<String> {
        let values = self.segment_values(params)?;

        match (&self.version_param, &self.base) {
            (Some(name), Some(base)) => {
                let version = values.get(name.as_str()).cloned().unwrap_or_default();
                let path = base.expand(&values)?;
                Ok(format!("{path}{VERSION_SEPARATOR}{version}"))
            }
            _ => {
                let path = self.uri.expand(&values)?;
                Ok(match &self.version {
                    Some(fixed) => format!("{path}{VERSION_SEPARATOR}{}", fixed.canonical()),
                    None => path,
                })
            }
        }
    }

    /// The canonical path with no version suffix, used to look up which
    /// versions of a resource are indexed.
    pub fn base_path(&self, params: &ParameterSet) -> Result<String> {
        let values = self.segment_values(params)?;
        self.base.as_ref().unwrap_or(&self.uri).expand(&values)
    }

    /// Check `params` against the declared types and stringify each value.
    fn segment_values<'a>(&self, params: &'a ParameterSet) -> Result<BTreeMap<&'a str, String>> {
        if let Some((name, value)) = params
            .iter()
            .find(|(name, _)| !self.parameter_types.contains_key(*name))
        {
            return Err(DocpipeError::ParameterType {
                name: name.clone(),
                expected: "no such parameter".into(),
                value: value.to_string(),
            });
        }

        let mut values = BTreeMap::new();
        for (name, value) in params {
            let expected = self.parameter_types[name];
            let text = match value {
                ParamValue::Version(v) => v.canonical().to_string(),
                other => other.to_string(),
            };
            let bad = |why: &str| DocpipeError::ParameterType {
                name: name.clone(),
                expected: format!("{expected} {why}"),
                value: text.clone(),
            };

            if value.param_type() != expected {
                return Err(bad("value"));
            }
            if text.is_empty() {
                return Err(bad("that is not empty"));
            }
            if text.contains(['/', VERSION_SEPARATOR]) {
                return Err(bad("without '/' or '~'"));
            }
            values.insert(name.as_str(), text);
        }

        if let Some(missing) = self
            .parameter_types
            .keys()
            .find(|name| !values.contains_key(name.as_str()))
        {
            return Err(DocpipeError::ParameterType {
                name: missing.clone(),
                expected: self.parameter_types[missing].to_string(),
                value: "<missing>".into(),
            });
        }
        Ok(values)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Extract, validate, and resolve the requested version against
    /// `available`. Returns the canonical path and the resolved parameters.
    ///
    /// With an empty `available`, the requested version is used as-is.
    pub fn resolve(&self, uri: &str, available: &[Version]) -> Result<(String, ParameterSet)> {
        let params = self.extract_parameters(uri)?;
        self.resolve_params(params, available)
    }

    /// Like [`resolve`](Self::resolve), with the available versions taken
    /// from what `index` holds under this resource's base path.
    pub fn resolve_in(&self, uri: &str, index: &EntryIndex) -> Result<(String, ParameterSet)> {
        let params = self.extract_parameters(uri)?;

        let Some(name) = &self.version_param else {
            return self.resolve_params(params, &[]);
        };

        let available = index.versions_under(&self.base_path(&params)?);
        if available.is_empty() {
            let requested = params
                .get(name)
                .and_then(ParamValue::as_version)
                .map(|v| v.raw().to_string())
                .unwrap_or_default();
            return Err(DocpipeError::NoCompatibleVersion {
                requested,
                available: Vec::new(),
            });
        }
        self.resolve_params(params, &available)
    }

    fn resolve_params(
        &self,
        mut params: ParameterSet,
        available: &[Version],
    ) -> Result<(String, ParameterSet)> {
        if let Some(name) = &self.version_param {
            if !available.is_empty() {
                if let Some(requested) = params.get(name).and_then(ParamValue::as_version) {
                    let resolved = resolve_inheritance(requested, available)?;
                    debug!(requested = %requested, resolved = %resolved, "version resolved");
                    params.insert(name.clone(), ParamValue::Version(resolved));
                }
            }
        }

        let path = self.render_path(&params)?;
        Ok((path, params))
    }
}

/// Split `docs://a/b~1.2.0` into `("docs://a/b", "1.2.0")` when the last
/// segment carries a version suffix.
fn split_version_suffix(uri: &str) -> Option<(&str, &str)> {
    let (head, version) = uri.rsplit_once(VERSION_SEPARATOR)?;
    (!version.contains('/')).then_some((head, version))
}

// ---------------------------------------------------------------------------
// TemplateRegistry
// ---------------------------------------------------------------------------

/// Ordered set of templates, tried in registration order.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<ResourceTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `[[templates]]` config entries, preserving their order.
    pub fn from_config(configs: &[TemplateConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(ResourceTemplate::from_config(config)?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, template: ResourceTemplate) -> &mut Self {
        self.templates.push(template);
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceTemplate> {
        self.templates.iter()
    }

    /// First template that matches `uri`, with its parameters.
    ///
    /// A mismatch moves on to the next template; any other error (a bad
    /// parameter value) stops the search.
    pub fn match_uri(&self, uri: &str) -> Result<(&ResourceTemplate, ParameterSet)> {
        self.first_match(uri, |template| template.extract_parameters(uri))
    }

    /// Resolve `uri` through the first matching template against `index`.
    pub fn resolve_in(
        &self,
        uri: &str,
        index: &EntryIndex,
    ) -> Result<(&ResourceTemplate, (String, ParameterSet))> {
        self.first_match(uri, |template| template.resolve_in(uri, index))
    }

    fn first_match<T>(
        &self,
        uri: &str,
        mut attempt: impl FnMut(&ResourceTemplate) -> Result<T>,
    ) -> Result<(&ResourceTemplate, T)> {
        for template in &self.templates {
            match attempt(template) {
                Ok(found) => return Ok((template, found)),
                Err(DocpipeError::TemplateMismatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DocpipeError::TemplateMismatch {
            template: "*".into(),
            uri: uri.to_string(),
            reason: format!("none of {} registered templates match", self.templates.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_shared::{Entry, EntryId};
    use proptest::prelude::*;

    fn types(pairs: &[(&str, ParamType)]) -> ParameterTypes {
        pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    fn api_template() -> ResourceTemplate {
        ResourceTemplate::new(
            "docs://api/{version}/{page}",
            types(&[("version", ParamType::Version), ("page", ParamType::String)]),
        )
        .expect("valid template")
    }

    #[test]
    fn slots_and_types_must_agree() {
        let missing_type = ResourceTemplate::new(
            "docs://api/{version}/{page}",
            types(&[("version", ParamType::Version)]),
        );
        assert!(matches!(missing_type, Err(DocpipeError::InvalidTemplate { .. })));

        let missing_slot = ResourceTemplate::new(
            "docs://api/{page}",
            types(&[("page", ParamType::String), ("lang", ParamType::String)]),
        );
        assert!(matches!(missing_slot, Err(DocpipeError::InvalidTemplate { .. })));

        let two_versions = ResourceTemplate::new(
            "docs://{a}/{b}",
            types(&[("a", ParamType::Version), ("b", ParamType::Version)]),
        );
        assert!(two_versions.is_err());

        let only_version =
            ResourceTemplate::new("docs://{v}", types(&[("v", ParamType::Version)]));
        assert!(only_version.is_err());
    }

    #[test]
    fn renders_canonical_path() {
        let template = api_template();
        let params = template
            .extract_parameters("docs://api/v1.2.0/endpoint")
            .expect("match");
        assert_eq!(params["page"], ParamValue::Str("endpoint".into()));
        assert_eq!(
            template.render_path(&params).unwrap(),
            "docs://api/endpoint~1.2.0"
        );
        assert_eq!(template.base_path(&params).unwrap(), "docs://api/endpoint");
    }

    #[test]
    fn round_trip_examples() {
        let cases: Vec<(ResourceTemplate, &str)> = vec![
            (api_template(), "docs://api/v1.2.0/endpoint"),
            (api_template(), "docs://api/2024-01-15/changelog"),
            (api_template(), "docs://api/nightly/setup"),
            (
                ResourceTemplate::new(
                    "docs://guide/{chapter}/{section}",
                    types(&[("chapter", ParamType::Integer), ("section", ParamType::String)]),
                )
                .unwrap(),
                "docs://guide/3/intro",
            ),
            (
                ResourceTemplate::new("docs://faq/{topic}", types(&[("topic", ParamType::String)]))
                    .unwrap()
                    .with_version("2.0"),
                "docs://faq/install",
            ),
            (
                ResourceTemplate::new(
                    "docs://{lang}/ref/{version}",
                    types(&[("lang", ParamType::String), ("version", ParamType::Version)]),
                )
                .unwrap(),
                "docs://rust/ref/1.85",
            ),
        ];

        for (template, uri) in cases {
            let params = template.extract_parameters(uri).expect(uri);
            let path = template.render_path(&params).expect(uri);
            let back = template.extract_parameters(&path).expect(&path);
            assert_eq!(back, params, "{uri} -> {path}");
            assert_eq!(template.render_path(&back).unwrap(), path);
        }
    }

    #[test]
    fn extract_rejects_versions_that_cannot_render() {
        let template = api_template();
        for uri in ["docs://api/ /endpoint", "docs://api/a~b/endpoint"] {
            let err = template.extract_parameters(uri).expect_err(uri);
            assert!(err.is_bad_parameter(), "{uri}: {err:?}");
        }
    }

    #[test]
    fn fixed_version_must_match() {
        let template =
            ResourceTemplate::new("docs://faq/{topic}", types(&[("topic", ParamType::String)]))
                .unwrap()
                .with_version("v2.0");
        assert!(template.extract_parameters("docs://faq/install~2.0.0").is_ok());
        let err = template
            .extract_parameters("docs://faq/install~3.0.0")
            .expect_err("wrong version");
        assert!(err.is_not_found());
    }

    #[test]
    fn render_rejects_reserved_characters() {
        let template = api_template();
        let mut params = template
            .extract_parameters("docs://api/1.0.0/page")
            .unwrap();
        params.insert("page".into(), ParamValue::Str("a/b".into()));
        assert!(template.render_path(&params).unwrap_err().is_bad_parameter());

        params.insert("page".into(), ParamValue::Str("a~b".into()));
        assert!(template.render_path(&params).unwrap_err().is_bad_parameter());

        params.insert("page".into(), ParamValue::Int(3));
        assert!(template.render_path(&params).unwrap_err().is_bad_parameter());
    }

    #[test]
    fn integer_parameters_are_type_checked() {
        let template = ResourceTemplate::new(
            "docs://guide/{chapter}",
            types(&[("chapter", ParamType::Integer)]),
        )
        .unwrap();
        let err = template
            .extract_parameters("docs://guide/intro")
            .expect_err("not an integer");
        assert!(err.is_bad_parameter());
    }

    #[test]
    fn resolve_versioned_resource() {
        let template = api_template();
        let available: Vec<Version> = ["1.0.0", "1.2.0", "2.0.0"]
            .into_iter()
            .map(normalize)
            .collect();

        let (path, params) = template
            .resolve("docs://api/v1.2.0/endpoint", &available)
            .expect("resolve");
        assert_eq!(path, "docs://api/endpoint~1.2.0");
        assert_eq!(params["page"], ParamValue::Str("endpoint".into()));
        assert_eq!(params["version"].as_version().unwrap().canonical(), "1.2.0");
    }

    #[test]
    fn resolve_inherits_partial_version() {
        let template = api_template();
        let available: Vec<Version> = ["1.0.0", "1.2.0", "1.2.5", "2.0.0"]
            .into_iter()
            .map(normalize)
            .collect();

        let (path, _) = template
            .resolve("docs://api/v1/endpoint", &available)
            .expect("resolve");
        assert_eq!(path, "docs://api/endpoint~1.2.5");

        let err = template
            .resolve("docs://api/v3/endpoint", &available)
            .expect_err("no 3.x");
        assert!(matches!(err, DocpipeError::NoCompatibleVersion { .. }));
    }

    #[test]
    fn resolve_in_uses_indexed_versions() {
        let template = api_template();
        let index = EntryIndex::new();
        for path in [
            "docs://api/endpoint~1.0.0",
            "docs://api/endpoint~1.4.1",
            "docs://api/other~1.9.0",
        ] {
            index.add(Entry::new(EntryId::new(), path, "x")).unwrap();
        }

        let (path, _) = template
            .resolve_in("docs://api/1/endpoint", &index)
            .expect("resolve");
        assert_eq!(path, "docs://api/endpoint~1.4.1");
        assert!(index.find_by_path(&path).is_some());

        let err = template
            .resolve_in("docs://api/1/missing", &index)
            .expect_err("nothing indexed");
        assert!(err.is_not_found());
    }

    #[test]
    fn registry_tries_templates_in_order() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(
                ResourceTemplate::new(
                    "docs://guide/{chapter}",
                    types(&[("chapter", ParamType::Integer)]),
                )
                .unwrap(),
            )
            .register(api_template());

        let (template, params) = registry
            .match_uri("docs://api/v1.2.0/endpoint")
            .expect("second template matches");
        assert_eq!(template.template(), "docs://api/{version}/{page}");
        assert_eq!(params.len(), 2);

        let err = registry.match_uri("docs://unknown").expect_err("no match");
        assert!(err.is_not_found());

        // A type error on a structural match stops the search.
        let err = registry.match_uri("docs://guide/intro").expect_err("bad int");
        assert!(err.is_bad_parameter());
    }

    #[test]
    fn registry_from_config() {
        let configs = vec![TemplateConfig {
            uri: "docs://api/{version}/{page}".into(),
            params: [
                ("version".to_string(), "version".to_string()),
                ("page".to_string(), "string".to_string()),
            ]
            .into(),
            version: None,
            release: Some("stable".into()),
        }];
        let registry = TemplateRegistry::from_config(&configs).expect("valid config");
        assert_eq!(registry.len(), 1);
        let template = registry.iter().next().unwrap();
        assert_eq!(template.release(), Some("stable"));
        assert_eq!(template.version_param(), Some("version"));

        let bad = vec![TemplateConfig {
            params: [("version".to_string(), "float".to_string())].into(),
            ..configs[0].clone()
        }];
        assert!(TemplateRegistry::from_config(&bad).is_err());
    }

    #[derive(Debug, Clone)]
    enum GenSegment {
        Literal(String),
        Typed(ParamType),
    }

    /// Templates with string and integer slots, literals, and at most one
    /// version slot that is never the only segment.
    fn arb_template() -> impl Strategy<Value = ResourceTemplate> {
        (
            prop::collection::vec(
                prop_oneof![
                    "[a-z]{1,6}".prop_map(GenSegment::Literal),
                    Just(GenSegment::Typed(ParamType::String)),
                    Just(GenSegment::Typed(ParamType::Integer)),
                ],
                1..4,
            ),
            prop::option::of(0usize..4),
        )
            .prop_map(|(mut segments, version_at)| {
                if let Some(at) = version_at {
                    let at = at.min(segments.len());
                    segments.insert(at, GenSegment::Typed(ParamType::Version));
                }
                let mut parameter_types = ParameterTypes::new();
                let path: Vec<String> = segments
                    .iter()
                    .enumerate()
                    .map(|(i, segment)| match segment {
                        GenSegment::Literal(literal) => literal.clone(),
                        GenSegment::Typed(ty) => {
                            let name = format!("p{i}");
                            parameter_types.insert(name.clone(), *ty);
                            format!("{{{name}}}")
                        }
                    })
                    .collect();
                ResourceTemplate::new(&format!("docs://{}", path.join("/")), parameter_types)
                    .expect("generated template is valid")
            })
    }

    fn arb_version() -> impl Strategy<Value = Version> {
        prop_oneof![
            (0u64..20, 0u64..20, 0u64..20).prop_map(|(a, b, c)| format!("{a}.{b}.{c}")),
            (0u64..20, 0u64..20).prop_map(|(a, b)| format!("v{a}.{b}")),
            (0u64..3, "(alpha|beta|rc)").prop_map(|(a, pre)| format!("{a}.0.0-{pre}.1")),
            (2000i32..2030, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("{y}.{m:02}.{d:02}")),
            "[a-z]{1,8}",
        ]
        .prop_map(|raw| normalize(&raw))
    }

    fn arb_template_with_params() -> impl Strategy<Value = (ResourceTemplate, ParameterSet)> {
        arb_template().prop_flat_map(|template| {
            let values: Vec<BoxedStrategy<(String, ParamValue)>> = template
                .parameter_types()
                .iter()
                .map(|(name, ty)| {
                    let value = match ty {
                        ParamType::String => "[A-Za-z0-9._-]{1,8}".prop_map(ParamValue::Str).boxed(),
                        ParamType::Integer => any::<i64>().prop_map(ParamValue::Int).boxed(),
                        ParamType::Version => arb_version().prop_map(ParamValue::Version).boxed(),
                    };
                    let name = name.clone();
                    value.prop_map(move |v| (name.clone(), v)).boxed()
                })
                .collect();
            (Just(template), values)
                .prop_map(|(template, pairs)| (template, pairs.into_iter().collect()))
        })
    }

    proptest! {
        #[test]
        fn round_trip_law((template, params) in arb_template_with_params()) {
            let path = template.render_path(&params).expect("generated values render");
            let back = template.extract_parameters(&path).expect("rendered path matches");
            prop_assert_eq!(&back, &params);
            prop_assert_eq!(template.render_path(&back).expect("renders again"), path);
        }

        #[test]
        fn expanded_form_extracts_the_same_parameters(
            (template, params) in arb_template_with_params()
        ) {
            let values: BTreeMap<&str, String> =
                params.iter().map(|(k, v)| (k.as_str(), v.to_string())).collect();
            let expanded = template.uri.expand(&values).expect("every slot filled");
            prop_assert_eq!(template.extract_parameters(&expanded).expect("expanded matches"), params);
        }

        #[test]
        fn whatever_extracts_also_renders(
            template in arb_template(),
            parts in prop::collection::vec("[a-z0-9 ~.]{1,4}", 4),
        ) {
            let values: BTreeMap<&str, String> = template
                .parameter_types()
                .keys()
                .map(String::as_str)
                .zip(parts.iter().cloned())
                .collect();
            let uri = template.uri.expand(&values).expect("every slot filled");

            if let Ok(params) = template.extract_parameters(&uri) {
                let path = template.render_path(&params);
                prop_assert!(path.is_ok(), "{} extracted but did not render: {:?}", uri, path);
                let back = template.extract_parameters(&path.expect("checked"));
                prop_assert_eq!(back.ok(), Some(params));
            }
        }
    }
}
