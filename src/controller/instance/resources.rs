//! Desired state of the Kubernetes objects owned by an instance
//!
//! Pure builders: each returns the complete object the matching stage
//! server-side applies. Every object carries a controller owner reference so
//! deleting the `Grafana` resource garbage-collects them.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, HTTPGetAction, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, Secret, SecretKeySelector,
    Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};

use crate::constants::{
    CONFIG_HASH_ANNOTATION, DEFAULT_ADMIN_USER, GRAFANA_HTTP_PORT, GRAFANA_INI_KEY,
};
use crate::controller::instance::ReconcileVars;
use crate::crd::{Grafana, IngressConfig, PersistentVolumeClaimConfig};

const CONFIG_VOLUME: &str = "grafana-config";
const DATA_VOLUME: &str = "grafana-data";
const CONFIG_MOUNT_PATH: &str = "/etc/grafana";
const DATA_MOUNT_PATH: &str = "/var/lib/grafana";

/// Labels identifying an instance's objects; also the pod selector
pub fn selector_labels(instance: &Grafana) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "grafana".to_string()),
        ("app.kubernetes.io/instance".to_string(), instance.name_any()),
    ])
}

fn common_labels(instance: &Grafana) -> BTreeMap<String, String> {
    let mut labels = selector_labels(instance);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "grafana-operator".to_string(),
    );
    labels
}

fn object_meta(
    instance: &Grafana,
    name: String,
    extra_labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> ObjectMeta {
    let mut labels = common_labels(instance);
    labels.extend(extra_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    ObjectMeta {
        name: Some(name),
        namespace: instance.namespace(),
        labels: Some(labels),
        annotations: (!annotations.is_empty()).then(|| annotations.clone()),
        owner_references: instance.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}

/// Generated admin credentials; only created when absent, never rotated
pub fn admin_secret(instance: &Grafana, password: &str) -> Secret {
    Secret {
        metadata: object_meta(
            instance,
            instance.admin_secret_name(),
            &BTreeMap::new(),
            &BTreeMap::new(),
        ),
        data: Some(BTreeMap::from([
            (
                instance.admin_user_key(),
                ByteString(DEFAULT_ADMIN_USER.as_bytes().to_vec()),
            ),
            (
                instance.admin_password_key(),
                ByteString(password.as_bytes().to_vec()),
            ),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn config_map(instance: &Grafana, ini: &str) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(
            instance,
            instance.config_map_name(),
            &BTreeMap::new(),
            &BTreeMap::new(),
        ),
        data: Some(BTreeMap::from([(
            GRAFANA_INI_KEY.to_string(),
            ini.to_string(),
        )])),
        ..Default::default()
    }
}

pub fn persistent_volume_claim(
    instance: &Grafana,
    config: &PersistentVolumeClaimConfig,
) -> PersistentVolumeClaim {
    let access_modes = if config.access_modes.is_empty() {
        vec!["ReadWriteOnce".to_string()]
    } else {
        config.access_modes.clone()
    };
    PersistentVolumeClaim {
        metadata: object_meta(instance, instance.pvc_name(), &BTreeMap::new(), &BTreeMap::new()),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(access_modes),
            storage_class_name: config.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(config.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service_account(instance: &Grafana) -> ServiceAccount {
    let config = instance.spec.service_account.clone().unwrap_or_default();
    ServiceAccount {
        metadata: object_meta(
            instance,
            instance.service_account_name(),
            &config.labels,
            &config.annotations,
        ),
        ..Default::default()
    }
}

pub fn service(instance: &Grafana) -> Service {
    let service_type = instance
        .spec
        .service
        .as_ref()
        .and_then(|s| s.service_type.clone())
        .unwrap_or_else(|| "ClusterIP".to_string());
    Service {
        metadata: object_meta(
            instance,
            instance.service_name(),
            &BTreeMap::new(),
            &BTreeMap::new(),
        ),
        spec: Some(ServiceSpec {
            type_: Some(service_type),
            selector: Some(selector_labels(instance)),
            ports: Some(vec![ServicePort {
                name: Some("grafana".to_string()),
                port: instance.service_port(),
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(GRAFANA_HTTP_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn ingress(instance: &Grafana, config: &IngressConfig) -> Ingress {
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: instance.service_name(),
            port: Some(ServiceBackendPort {
                number: Some(instance.service_port()),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };
    Ingress {
        metadata: object_meta(
            instance,
            instance.ingress_name(),
            &config.labels,
            &config.annotations,
        ),
        spec: Some(IngressSpec {
            ingress_class_name: config.ingress_class_name.clone(),
            rules: Some(vec![IngressRule {
                host: Some(config.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(config.path.clone().unwrap_or_else(|| "/".to_string())),
                        path_type: "Prefix".to_string(),
                        backend,
                    }],
                }),
            }]),
            tls: config.tls_secret_name.as_ref().map(|secret| {
                vec![IngressTLS {
                    hosts: Some(vec![config.host.clone()]),
                    secret_name: Some(secret.clone()),
                }]
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key,
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn plain_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// The Grafana workload; the config hash annotation restarts pods on config changes
pub fn deployment(instance: &Grafana, vars: &ReconcileVars, default_image: &str) -> Deployment {
    let overrides = instance.spec.deployment.clone().unwrap_or_default();
    let admin_secret = instance.admin_secret_name();

    let mut env = vec![
        secret_env(
            crate::constants::ADMIN_USER_KEY,
            &admin_secret,
            instance.admin_user_key(),
        ),
        secret_env(
            crate::constants::ADMIN_PASSWORD_KEY,
            &admin_secret,
            instance.admin_password_key(),
        ),
        plain_env(
            "GF_PATHS_CONFIG",
            &format!("{CONFIG_MOUNT_PATH}/{GRAFANA_INI_KEY}"),
        ),
    ];
    if !vars.plugins.is_empty() {
        env.push(plain_env("GF_INSTALL_PLUGINS", &vars.plugins));
    }
    env.extend(overrides.env.iter().map(|e| plain_env(&e.name, &e.value)));

    let data_volume = match instance.spec.persistent_volume_claim {
        Some(_) => Volume {
            name: DATA_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: instance.pvc_name(),
                ..Default::default()
            }),
            ..Default::default()
        },
        None => Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    };
    let config_volume = Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: instance.config_map_name(),
            ..Default::default()
        }),
        ..Default::default()
    };

    let container = Container {
        name: "grafana".to_string(),
        image: Some(overrides.image.clone().unwrap_or_else(|| default_image.to_string())),
        ports: Some(vec![ContainerPort {
            name: Some("grafana-http".to_string()),
            container_port: GRAFANA_HTTP_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/api/health".to_string()),
                port: IntOrString::Int(GRAFANA_HTTP_PORT),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut pod_labels = selector_labels(instance);
    pod_labels.extend(overrides.labels.clone());
    let mut pod_annotations = overrides.annotations.clone();
    pod_annotations.insert(
        CONFIG_HASH_ANNOTATION.to_string(),
        vars.config_hash.clone(),
    );

    Deployment {
        metadata: object_meta(
            instance,
            instance.deployment_name(),
            &overrides.labels,
            &BTreeMap::new(),
        ),
        spec: Some(DeploymentSpec {
            replicas: Some(overrides.replicas.unwrap_or(1)),
            selector: LabelSelector {
                match_labels: Some(selector_labels(instance)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(instance.service_account_name()),
                    containers: vec![container],
                    volumes: Some(vec![config_volume, data_volume]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Base URL of the instance's HTTP API
///
/// `externalUrl` wins; then the ingress host when the client prefers it;
/// otherwise the in-cluster service address.
pub fn admin_url(instance: &Grafana) -> String {
    if let Some(url) = instance
        .spec
        .external_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    {
        return url.trim_end_matches('/').to_string();
    }

    if instance.prefer_ingress() {
        if let Some(ingress) = instance
            .spec
            .ingress
            .as_ref()
            .filter(|i| !i.host.is_empty())
        {
            let scheme = if ingress.tls_secret_name.is_some() {
                "https"
            } else {
                "http"
            };
            return format!("{scheme}://{}", ingress.host);
        }
    }

    format!(
        "http://{}.{}:{}",
        instance.service_name(),
        instance.namespace().unwrap_or_default(),
        instance.service_port()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GrafanaClientConfig, GrafanaSpec, ServiceConfig};

    fn instance() -> Grafana {
        let mut grafana = Grafana::new("grafana-a", GrafanaSpec::default());
        grafana.metadata.namespace = Some("monitoring".to_string());
        grafana.metadata.uid = Some("1234".to_string());
        grafana
    }

    #[test]
    fn test_admin_url_defaults_to_service() {
        assert_eq!(
            admin_url(&instance()),
            "http://grafana-a-service.monitoring:3000"
        );

        let mut custom_port = instance();
        custom_port.spec.service = Some(ServiceConfig {
            port: Some(80),
            ..Default::default()
        });
        assert_eq!(
            admin_url(&custom_port),
            "http://grafana-a-service.monitoring:80"
        );
    }

    #[test]
    fn test_admin_url_prefers_ingress_when_asked() {
        let mut grafana = instance();
        grafana.spec.ingress = Some(IngressConfig {
            host: "grafana.example.com".to_string(),
            tls_secret_name: Some("tls".to_string()),
            ..Default::default()
        });
        assert_eq!(
            admin_url(&grafana),
            "http://grafana-a-service.monitoring:3000"
        );

        grafana.spec.client = Some(GrafanaClientConfig {
            prefer_ingress: Some(true),
            ..Default::default()
        });
        assert_eq!(admin_url(&grafana), "https://grafana.example.com");
    }

    #[test]
    fn test_admin_url_external_wins() {
        let mut grafana = instance();
        grafana.spec.external_url = Some("https://grafana.corp/".to_string());
        assert_eq!(admin_url(&grafana), "https://grafana.corp");
    }

    #[test]
    fn test_objects_are_owned_by_instance() {
        let grafana = instance();
        let map = config_map(&grafana, "[server]\n");
        let owners = map.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Grafana");
        assert_eq!(owners[0].name, "grafana-a");
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(map.metadata.namespace.as_deref(), Some("monitoring"));
    }

    #[test]
    fn test_deployment_carries_config_hash_and_plugins() {
        let vars = ReconcileVars {
            config_hash: "abc123".to_string(),
            plugins: "clock 1.0.0".to_string(),
        };
        let deployment = deployment(&instance(), &vars, "grafana/grafana:test");
        let spec = deployment.spec.unwrap();
        let template_meta = spec.template.metadata.unwrap();
        assert_eq!(
            template_meta.annotations.unwrap()[CONFIG_HASH_ANNOTATION],
            "abc123"
        );

        let pod = spec.template.spec.unwrap();
        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("grafana/grafana:test"));
        let env = container.env.as_ref().unwrap();
        let plugins = env.iter().find(|e| e.name == "GF_INSTALL_PLUGINS").unwrap();
        assert_eq!(plugins.value.as_deref(), Some("clock 1.0.0"));
        let user = env.iter().find(|e| e.name == "GF_SECURITY_ADMIN_USER").unwrap();
        let secret_ref = user
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(secret_ref.name, "grafana-a-admin-credentials");

        let volumes = pod.volumes.unwrap();
        assert!(volumes.iter().any(|v| v.empty_dir.is_some()));
    }

    #[test]
    fn test_deployment_without_plugins_omits_install_env() {
        let deployment = deployment(&instance(), &ReconcileVars::default(), "img");
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        let env = pod.containers[0].env.as_ref().unwrap();
        assert!(env.iter().all(|e| e.name != "GF_INSTALL_PLUGINS"));
    }

    #[test]
    fn test_pvc_defaults_access_mode() {
        let claim = persistent_volume_claim(
            &instance(),
            &PersistentVolumeClaimConfig {
                size: "10Gi".to_string(),
                ..Default::default()
            },
        );
        let spec = claim.spec.unwrap();
        assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        assert_eq!(
            spec.resources.unwrap().requests.unwrap()["storage"],
            Quantity("10Gi".to_string())
        );
    }
}
