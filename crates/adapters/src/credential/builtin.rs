// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injectors for the managed cloud credential types.

use std::sync::Arc;

use ax_core::Credential;
use serde::Serialize;

use super::{
    required, write_error, CredentialInjector, InjectionTarget, InjectorError, InjectorRegistry,
    PrivateDataWriter,
};

const SECRET_MODE: u32 = 0o600;

/// One input field exported as an environment variable.
#[derive(Debug, Clone, Copy)]
pub struct EnvField {
    pub env: &'static str,
    pub field: &'static str,
    pub secret: bool,
    pub required: bool,
}

impl EnvField {
    pub const fn plain(env: &'static str, field: &'static str) -> Self {
        Self { env, field, secret: false, required: false }
    }

    pub const fn secret(env: &'static str, field: &'static str) -> Self {
        Self { env, field, secret: true, required: false }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Maps inputs onto environment variables; empty optional inputs are skipped.
#[derive(Debug, Clone)]
pub struct EnvMappingInjector {
    fields: Vec<EnvField>,
    constants: Vec<(&'static str, &'static str)>,
}

impl EnvMappingInjector {
    pub fn new(fields: Vec<EnvField>) -> Self {
        Self { fields, constants: Vec::new() }
    }

    pub fn with_constant(mut self, env: &'static str, value: &'static str) -> Self {
        self.constants.push((env, value));
        self
    }

    pub fn aws() -> Self {
        Self::new(vec![
            EnvField::plain("AWS_ACCESS_KEY_ID", "username").required(),
            EnvField::secret("AWS_SECRET_ACCESS_KEY", "password").required(),
            EnvField::secret("AWS_SECURITY_TOKEN", "security_token"),
            EnvField::secret("AWS_SESSION_TOKEN", "security_token"),
        ])
    }

    pub fn azure_rm() -> Self {
        Self::new(vec![
            EnvField::plain("AZURE_SUBSCRIPTION_ID", "subscription").required(),
            EnvField::plain("AZURE_CLIENT_ID", "client"),
            EnvField::secret("AZURE_SECRET", "secret"),
            EnvField::plain("AZURE_TENANT", "tenant"),
            EnvField::plain("AZURE_AD_USER", "username"),
            EnvField::secret("AZURE_PASSWORD", "password"),
            EnvField::plain("AZURE_CLOUD_ENVIRONMENT", "cloud_environment"),
        ])
    }

    pub fn vmware() -> Self {
        Self::new(vec![
            EnvField::plain("VMWARE_USER", "username").required(),
            EnvField::secret("VMWARE_PASSWORD", "password").required(),
            EnvField::plain("VMWARE_HOST", "host").required(),
        ])
        .with_constant("VMWARE_VALIDATE_CERTS", "False")
    }

    pub fn satellite6() -> Self {
        Self::new(vec![
            EnvField::plain("FOREMAN_SERVER", "host").required(),
            EnvField::plain("FOREMAN_USER", "username").required(),
            EnvField::secret("FOREMAN_PASSWORD", "password").required(),
        ])
    }

    pub fn controller() -> Self {
        Self::new(vec![
            EnvField::plain("CONTROLLER_HOST", "host").required(),
            EnvField::plain("CONTROLLER_USERNAME", "username"),
            EnvField::secret("CONTROLLER_PASSWORD", "password"),
            EnvField::secret("CONTROLLER_OAUTH_TOKEN", "oauth_token"),
        ])
    }
}

impl CredentialInjector for EnvMappingInjector {
    fn inject(
        &self,
        credential: &Credential,
        target: &mut InjectionTarget,
        _private_data: &dyn PrivateDataWriter,
    ) -> Result<(), InjectorError> {
        for field in &self.fields {
            let value = if field.required {
                required(credential, field.field)?
            } else {
                match credential.input(field.field).filter(|v| !v.is_empty()) {
                    Some(v) => v,
                    None => continue,
                }
            };
            if field.secret {
                target.set_secret(field.env, value);
            } else {
                target.set(field.env, value);
            }
        }
        for (env, value) in &self.constants {
            target.set(*env, *value);
        }
        Ok(())
    }
}

/// Google Compute Engine: a service account JSON file plus env pointers to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct GceInjector;

#[derive(Serialize)]
struct GceServiceAccount<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    private_key: String,
    client_email: String,
    project_id: String,
    token_uri: &'a str,
}

impl CredentialInjector for GceInjector {
    fn inject(
        &self,
        credential: &Credential,
        target: &mut InjectionTarget,
        private_data: &dyn PrivateDataWriter,
    ) -> Result<(), InjectorError> {
        let account = GceServiceAccount {
            kind: "service_account",
            private_key: required(credential, "ssh_key_data")?,
            client_email: required(credential, "username")?,
            project_id: credential.input_or_default("project"),
            token_uri: "https://oauth2.googleapis.com/token",
        };
        let json = serde_json::to_string(&account).map_err(|e| InjectorError::Render {
            credential: credential.name.clone(),
            message: e.to_string(),
        })?;
        let host_path = private_data
            .write_file(None, &json, Some("env"), SECRET_MODE)
            .map_err(write_error(credential))?;
        let path = private_data.runner_path(&host_path);

        target.set("GCE_EMAIL", account.client_email.clone());
        target.set("GCE_PROJECT", account.project_id.clone());
        target.set("GCE_CREDENTIALS_FILE_PATH", path.clone());
        target.set("GOOGLE_APPLICATION_CREDENTIALS", path.clone());
        target.set("GCP_AUTH_KIND", "serviceaccount");
        target.set("GCP_PROJECT", account.project_id);
        target.set("GCP_ENV_TYPE", "tower");
        target.set("GCP_SERVICE_ACCOUNT_FILE", path);
        Ok(())
    }
}

/// OpenStack: a `clouds.yaml` with a single `devstack` cloud.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenStackInjector;

#[derive(Serialize)]
struct CloudsYaml {
    clouds: std::collections::BTreeMap<&'static str, OpenStackCloud>,
}

#[derive(Serialize)]
struct OpenStackCloud {
    auth: OpenStackAuth,
    verify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    region_name: Option<String>,
    private: bool,
}

#[derive(Serialize)]
struct OpenStackAuth {
    auth_url: String,
    username: String,
    password: String,
    project_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain_name: Option<String>,
}

impl CredentialInjector for OpenStackInjector {
    fn inject(
        &self,
        credential: &Credential,
        target: &mut InjectionTarget,
        private_data: &dyn PrivateDataWriter,
    ) -> Result<(), InjectorError> {
        let nonempty = |field: &str| credential.input(field).filter(|v| !v.is_empty());
        let cloud = OpenStackCloud {
            auth: OpenStackAuth {
                auth_url: required(credential, "host")?,
                username: required(credential, "username")?,
                password: required(credential, "password")?,
                project_name: required(credential, "project")?,
                project_domain_name: nonempty("project_domain_name"),
                domain_name: nonempty("domain"),
            },
            verify: credential.inputs.get("verify_ssl").map_or(true, |_| credential.input_bool("verify_ssl")),
            region_name: nonempty("region"),
            private: true,
        };
        let doc = CloudsYaml { clouds: [("devstack", cloud)].into_iter().collect() };
        let yaml = serde_yaml::to_string(&doc).map_err(|e| InjectorError::Render {
            credential: credential.name.clone(),
            message: e.to_string(),
        })?;
        let host_path = private_data
            .write_file(None, &yaml, Some("env"), SECRET_MODE)
            .map_err(write_error(credential))?;
        target.set("OS_CLIENT_CONFIG_FILE", private_data.runner_path(&host_path));
        Ok(())
    }
}

/// Kubernetes/OpenShift bearer token.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubernetesInjector;

impl CredentialInjector for KubernetesInjector {
    fn inject(
        &self,
        credential: &Credential,
        target: &mut InjectionTarget,
        private_data: &dyn PrivateDataWriter,
    ) -> Result<(), InjectorError> {
        target.set("K8S_AUTH_HOST", required(credential, "host")?);
        target.set_secret("K8S_AUTH_API_KEY", required(credential, "bearer_token")?);
        let verify = credential.input_bool("verify_ssl");
        target.set("K8S_AUTH_VERIFY_SSL", if verify { "True" } else { "False" });
        if let Some(ca) = credential.input("ssl_ca_cert").filter(|v| verify && !v.is_empty()) {
            let host_path = private_data
                .write_file(None, &ca, Some("env"), SECRET_MODE)
                .map_err(write_error(credential))?;
            target.set("K8S_AUTH_SSL_CA_CERT", private_data.runner_path(&host_path));
        }
        Ok(())
    }
}

pub(super) fn register_all(registry: &mut InjectorRegistry) {
    registry.register("aws", Arc::new(EnvMappingInjector::aws()));
    registry.register("azure_rm", Arc::new(EnvMappingInjector::azure_rm()));
    registry.register("vmware", Arc::new(EnvMappingInjector::vmware()));
    registry.register("satellite6", Arc::new(EnvMappingInjector::satellite6()));
    registry.register("controller", Arc::new(EnvMappingInjector::controller()));
    registry.register("gce", Arc::new(GceInjector));
    registry.register("openstack", Arc::new(OpenStackInjector));
    registry.register("kubernetes_bearer_token", Arc::new(KubernetesInjector));
}
