//! The dry-run pod.

use crate::cluster::{Container, Pod, PodSpec, SecretVolumeSource, Volume, VolumeMount};
use crate::config::{CheckerSettings, Fingerprint};
use crate::render::{BASE_CONFIG_NAME, OPERATOR_CONFIG_PATH, SECRET_PATH, STOCK_BIN_PATH, TLS_PATH};

use super::artifacts::CheckNaming;

const CONTAINER_NAME: &str = "fluent-bit";
const CONFIG_VOLUME: &str = "config";
const OUTPUT_SECRET_VOLUME: &str = "output-secret";
const TLS_VOLUME: &str = "fluent-bit-tls";

/// Builds the pod that runs the agent in dry-run mode against the config
/// secret of `fingerprint`. It never restarts, so its terminal phase is the
/// verdict.
#[must_use]
pub fn dry_run_pod(
    settings: &CheckerSettings,
    naming: &CheckNaming,
    fingerprint: &Fingerprint,
) -> Pod {
    let mut meta = naming.metadata(naming.pod_name(fingerprint), fingerprint);
    meta.annotations = settings.annotations.clone();

    let mut volumes = vec![
        secret_volume(CONFIG_VOLUME, naming.config_name(fingerprint)),
        secret_volume(OUTPUT_SECRET_VOLUME, naming.output_name(fingerprint)),
    ];
    let mut mounts = vec![
        mount(CONFIG_VOLUME, OPERATOR_CONFIG_PATH),
        mount(OUTPUT_SECRET_VOLUME, SECRET_PATH),
    ];

    if let Some(tls_secret) = settings.tls_secret.as_deref().filter(|s| !s.is_empty()) {
        volumes.push(secret_volume(TLS_VOLUME, tls_secret.to_string()));
        mounts.push(mount(TLS_VOLUME, TLS_PATH));
    }

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: settings.image.clone(),
        image_pull_policy: settings.image_pull_policy.clone(),
        command: vec![STOCK_BIN_PATH.to_string()],
        args: vec![
            String::from("-c"),
            format!("{OPERATOR_CONFIG_PATH}/{BASE_CONFIG_NAME}"),
            String::from("--dry-run"),
        ],
        volume_mounts: mounts,
        security_context: settings.security_context.clone(),
        resources: settings.resources.clone(),
    };

    Pod::new(
        meta,
        PodSpec {
            restart_policy: String::from("Never"),
            service_account_name: settings.service_account.clone(),
            node_selector: settings.node_selector.clone(),
            containers: vec![container],
            volumes,
            tolerations: settings.tolerations.clone(),
            affinity: settings.affinity.clone(),
            priority_class_name: settings.priority_class_name.clone(),
            security_context: settings.pod_security_context.clone(),
        },
    )
}

fn secret_volume(name: &str, secret_name: String) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource { secret_name }),
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: true,
    }
}
