//! Naming, labelling and construction of validation artifacts.
//!
//! Every object belonging to one fingerprint is named deterministically from
//! the prefix and the fingerprint, so existence checks stand in for locking.

use std::collections::BTreeMap;

use crate::cluster::{LabelSelector, ObjectMeta, Secret};
use crate::config::{CheckerSettings, Fingerprint, KeyValues};
use crate::render::RenderedConfig;

/// Label marking the validation role.
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Value of [`COMPONENT_LABEL`] on validation objects.
pub const COMPONENT_VALUE: &str = "configcheck";

/// Label naming the owner.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on validation objects.
pub const MANAGED_BY_VALUE: &str = "logship-configcheck";

/// Label carrying the name prefix, so checkers with different prefixes
/// never see each other's objects.
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Label carrying the fingerprint.
pub const FINGERPRINT_LABEL: &str = "logship.io/config-fingerprint";

/// Annotation carrying the full digest of the rendered config.
pub const DIGEST_ANNOTATION: &str = "logship.io/config-digest";

/// Deterministic names and labels for one checker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckNaming {
    prefix: String,
    namespace: String,
}

impl CheckNaming {
    /// Creates naming for the given settings.
    #[must_use]
    pub fn new(settings: &CheckerSettings) -> Self {
        Self {
            prefix: settings.name_prefix.clone(),
            namespace: settings.namespace.clone(),
        }
    }

    /// Returns the namespace objects live in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the config secret. The workload pod shares it.
    #[must_use]
    pub fn config_name(&self, fingerprint: &Fingerprint) -> String {
        format!("{}-configcheck-{fingerprint}", self.prefix)
    }

    /// Name of the output secret.
    #[must_use]
    pub fn output_name(&self, fingerprint: &Fingerprint) -> String {
        format!("{}-configcheck-output-{fingerprint}", self.prefix)
    }

    /// Name of the workload pod.
    #[must_use]
    pub fn pod_name(&self, fingerprint: &Fingerprint) -> String {
        self.config_name(fingerprint)
    }

    /// Selector matching every validation object of this instance.
    #[must_use]
    pub fn role_selector(&self) -> LabelSelector {
        LabelSelector::new()
            .with(COMPONENT_LABEL, COMPONENT_VALUE)
            .with(MANAGED_BY_LABEL, MANAGED_BY_VALUE)
            .with(INSTANCE_LABEL, self.prefix.as_str())
    }

    /// Labels of the objects belonging to `fingerprint`.
    #[must_use]
    pub fn labels(&self, fingerprint: &Fingerprint) -> BTreeMap<String, String> {
        [
            (COMPONENT_LABEL, COMPONENT_VALUE),
            (MANAGED_BY_LABEL, MANAGED_BY_VALUE),
            (INSTANCE_LABEL, self.prefix.as_str()),
            (FINGERPRINT_LABEL, fingerprint.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Object metadata for `name` belonging to `fingerprint`.
    #[must_use]
    pub fn metadata(&self, name: String, fingerprint: &Fingerprint) -> ObjectMeta {
        let mut meta = ObjectMeta::new(self.namespace.clone(), name);
        meta.labels = self.labels(fingerprint);
        meta
    }

    /// Reads the fingerprint from an object's labels.
    #[must_use]
    pub fn fingerprint_of(meta: &ObjectMeta) -> Option<Fingerprint> {
        meta.labels
            .get(FINGERPRINT_LABEL)
            .and_then(|value| Fingerprint::parse(value).ok())
    }
}

/// The config secret and output secret of one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationArtifactSet {
    /// Secret holding the rendered files, annotated with the full digest.
    pub config_secret: Secret,
    /// Secret holding the output secret data.
    pub output_secret: Secret,
}

impl ValidationArtifactSet {
    /// Builds the artifact set for a rendered config.
    #[must_use]
    pub fn build(
        naming: &CheckNaming,
        fingerprint: &Fingerprint,
        rendered: &RenderedConfig,
        secrets: &KeyValues,
    ) -> Self {
        let mut config_meta = naming.metadata(naming.config_name(fingerprint), fingerprint);
        config_meta
            .annotations
            .insert(DIGEST_ANNOTATION.to_string(), rendered.digest());

        let files = rendered
            .files()
            .iter()
            .map(|f| (f.name.clone(), f.content.clone()))
            .collect();

        let secret_data = secrets
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            config_secret: Secret::new(config_meta, files),
            output_secret: Secret::new(
                naming.metadata(naming.output_name(fingerprint), fingerprint),
                secret_data,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::render::{Renderer, BASE_CONFIG_NAME};

    fn fingerprint() -> Fingerprint {
        Fingerprint::parse("0123456789abcdef").unwrap()
    }

    #[test]
    fn test_names() {
        let naming = CheckNaming::new(&CheckerSettings::default());
        let fp = fingerprint();

        assert_eq!(naming.config_name(&fp), "fluentbit-configcheck-0123456789abcdef");
        assert_eq!(naming.pod_name(&fp), naming.config_name(&fp));
        assert_eq!(
            naming.output_name(&fp),
            "fluentbit-configcheck-output-0123456789abcdef"
        );
        assert!(naming.output_name(&fp).len() <= 63);
    }

    #[test]
    fn test_labels_match_role_selector() {
        let naming = CheckNaming::new(&CheckerSettings::default());
        let meta = naming.metadata(String::from("x"), &fingerprint());

        assert!(naming.role_selector().matches(&meta.labels));
        assert_eq!(meta.namespace, "logging");
        assert_eq!(CheckNaming::fingerprint_of(&meta), Some(fingerprint()));

        let other = CheckNaming::new(&CheckerSettings {
            name_prefix: String::from("other"),
            ..CheckerSettings::default()
        });
        assert!(!other.role_selector().matches(&meta.labels));
    }

    #[test]
    fn test_artifact_set_contents() {
        let naming = CheckNaming::new(&CheckerSettings::default());
        let rendered = Renderer::new().render(&AgentConfig::default()).unwrap();
        let fp = rendered.fingerprint();
        let secrets = KeyValues::new().with("password", "hunter2");

        let set = ValidationArtifactSet::build(&naming, &fp, &rendered, &secrets);

        assert_eq!(
            set.config_secret.string_data.get(BASE_CONFIG_NAME).map(String::as_str),
            Some(rendered.main())
        );
        assert_eq!(
            set.config_secret.metadata.annotations.get(DIGEST_ANNOTATION),
            Some(&rendered.digest())
        );
        assert_eq!(
            set.output_secret.string_data.get("password").map(String::as_str),
            Some("hunter2")
        );
        assert_eq!(CheckNaming::fingerprint_of(&set.output_secret.metadata), Some(fp));
    }
}
