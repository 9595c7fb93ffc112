//! Helper methods only available for tests
//!
//! `ApiServerHandle` answers the requests of a real `kube::Client` from an
//! in-memory object store, so reconcilers run their actual API calls in tests.
//! It assigns resource versions and generations, allocates service cluster
//! IPs, keeps the status subresource apart, and counts write calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use http::{Method, Request, Response, StatusCode};
use kube::{client::Body, Client};
use serde_json::{json, Value};

use crate::api::v1beta1::ssp::{CommonTemplates, Ssp, SspSpec, TemplateValidator};
use crate::common::is_valid_label_value;

pub const NAMESPACE: &str = "kubevirt";
pub const SSP_NAME: &str = "test-ssp";
pub const TEMPLATES_NAMESPACE: &str = "kubevirt-templates";

/// An SSP as the orchestrator would receive it from the watcher.
pub fn test_ssp(replicas: i32) -> Ssp {
    let mut ssp = Ssp::new(
        SSP_NAME,
        SspSpec {
            template_validator: TemplateValidator {
                replicas: Some(replicas),
                placement: None,
            },
            common_templates: CommonTemplates {
                namespace: TEMPLATES_NAMESPACE.to_string(),
            },
        },
    );
    ssp.metadata.namespace = Some(NAMESPACE.to_string());
    ssp.metadata.uid = Some("0b9f4e7c-ssp-test".to_string());
    ssp.metadata.generation = Some(1);
    ssp
}

#[derive(Clone, Debug, PartialEq)]
pub struct Write {
    pub method: Method,
    pub resource: String,
    pub name: String,
}

#[derive(Default)]
struct Store {
    objects: BTreeMap<String, Value>,
    next_version: u64,
    next_ip: u8,
    writes: Vec<Write>,
    failing: Vec<String>,
}

/// Request path split into the pieces the store cares about.
struct Target {
    collection: String,
    resource: String,
    namespace: Option<String>,
    name: Option<String>,
    subresource: Option<String>,
}

impl Target {
    fn parse(path: &str) -> Option<Target> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let prefix_len = match segments.first()? {
            &"api" => 2,
            &"apis" => 3,
            _ => return None,
        };
        let prefix = segments.get(..prefix_len)?.join("/");
        let rest = segments.get(prefix_len..)?;

        let (namespace, rest) = match rest {
            ["namespaces", ns, tail @ ..] if !tail.is_empty() => (Some(ns.to_string()), tail),
            _ => (None, rest),
        };
        let resource = rest.first()?.to_string();
        let collection = match &namespace {
            Some(ns) => format!("/{prefix}/namespaces/{ns}/{resource}"),
            None => format!("/{prefix}/{resource}"),
        };

        Some(Target {
            collection,
            resource,
            namespace,
            name: rest.get(1).map(|s| s.to_string()),
            subresource: rest.get(2).map(|s| s.to_string()),
        })
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.collection, name)
    }
}

fn status_response(code: StatusCode, reason: &str, message: String) -> (StatusCode, Value) {
    (
        code,
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code.as_u16(),
        }),
    )
}

/// Rejects label values the API server would refuse with 422.
fn validate_labels(obj: &Value) -> Result<(), (StatusCode, Value)> {
    let Some(labels) = obj["metadata"]["labels"].as_object() else {
        return Ok(());
    };
    for (key, value) in labels {
        let value = value.as_str().unwrap_or_default();
        if !is_valid_label_value(value) {
            return Err(status_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid",
                format!("metadata.labels: Invalid value: \"{value}\" for label {key}"),
            ));
        }
    }
    Ok(())
}

fn not_found(name: &str) -> (StatusCode, Value) {
    status_response(StatusCode::NOT_FOUND, "NotFound", format!("\"{name}\" not found"))
}

/// RFC 7386 merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl Store {
    fn bump_version(&mut self, obj: &mut Value) {
        self.next_version += 1;
        obj["metadata"]["resourceVersion"] = json!(self.next_version.to_string());
    }

    fn record(&mut self, method: &Method, target: &Target, name: &str) {
        self.writes.push(Write {
            method: method.clone(),
            resource: target.resource.clone(),
            name: name.to_string(),
        });
    }

    fn handle(&mut self, method: &Method, path: &str, body: &[u8]) -> (StatusCode, Value) {
        let Some(target) = Target::parse(path) else {
            return not_found(path);
        };
        let body: Value = if body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(body) {
                Ok(body) => body,
                Err(e) => return status_response(StatusCode::BAD_REQUEST, "BadRequest", e.to_string()),
            }
        };

        if *method != Method::GET && self.failing.contains(&target.resource) {
            return status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                format!("writes to {} are failing", target.resource),
            );
        }

        match (method.as_str(), target.name.as_deref()) {
            ("GET", Some(name)) => match self.objects.get(&target.key(name)) {
                Some(obj) => (StatusCode::OK, obj.clone()),
                None => not_found(name),
            },
            ("GET", None) => {
                let items: Vec<Value> = self
                    .objects
                    .iter()
                    .filter(|(key, _)| key.starts_with(&format!("{}/", target.collection)))
                    .map(|(_, obj)| obj.clone())
                    .collect();
                (
                    StatusCode::OK,
                    json!({ "kind": "List", "apiVersion": "v1", "metadata": {}, "items": items }),
                )
            }
            ("POST", None) => self.create(method, &target, body),
            ("PUT", Some(name)) => self.replace(method, &target, name, body),
            ("PATCH", Some(name)) => self.patch(method, &target, name, body),
            ("DELETE", Some(name)) => match self.objects.remove(&target.key(name)) {
                Some(obj) => {
                    self.record(method, &target, name);
                    (StatusCode::OK, obj)
                }
                None => not_found(name),
            },
            _ => status_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "MethodNotAllowed",
                format!("{method} {path}"),
            ),
        }
    }

    fn create(&mut self, method: &Method, target: &Target, mut obj: Value) -> (StatusCode, Value) {
        let Some(name) = obj["metadata"]["name"].as_str().map(str::to_string) else {
            return status_response(StatusCode::BAD_REQUEST, "Invalid", "name is required".to_string());
        };
        if let Err(invalid) = validate_labels(&obj) {
            return invalid;
        }
        let key = target.key(&name);
        if self.objects.contains_key(&key) {
            return status_response(
                StatusCode::CONFLICT,
                "AlreadyExists",
                format!("\"{name}\" already exists"),
            );
        }

        if let Some(obj) = obj.as_object_mut() {
            obj.remove("status");
        }
        if let Some(ns) = &target.namespace {
            obj["metadata"]["namespace"] = json!(ns);
        }
        obj["metadata"]["uid"] = json!(format!("uid-{}-{}", target.resource, name));
        obj["metadata"]["creationTimestamp"] = json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        if obj.get("spec").is_some() {
            obj["metadata"]["generation"] = json!(1);
        }
        if target.resource == "services" && obj["spec"]["clusterIP"].is_null() {
            self.next_ip += 1;
            let ip = format!("10.96.0.{}", self.next_ip);
            obj["spec"]["clusterIP"] = json!(ip);
            obj["spec"]["clusterIPs"] = json!([ip]);
        }
        self.bump_version(&mut obj);

        self.objects.insert(key, obj.clone());
        self.record(method, target, &name);
        (StatusCode::CREATED, obj)
    }

    fn replace(&mut self, method: &Method, target: &Target, name: &str, mut obj: Value) -> (StatusCode, Value) {
        let key = target.key(name);
        let Some(stored) = self.objects.get(&key).cloned() else {
            return not_found(name);
        };

        let sent_version = obj["metadata"]["resourceVersion"].as_str().unwrap_or_default();
        if !sent_version.is_empty() && stored["metadata"]["resourceVersion"] != json!(sent_version) {
            return status_response(
                StatusCode::CONFLICT,
                "Conflict",
                format!("the object \"{name}\" has been modified"),
            );
        }

        let mut updated = if target.subresource.as_deref() == Some("status") {
            let mut updated = stored.clone();
            updated["status"] = obj["status"].take();
            updated
        } else {
            if let Err(invalid) = validate_labels(&obj) {
                return invalid;
            }
            for field in ["uid", "creationTimestamp", "generation", "namespace"] {
                if let Some(value) = stored["metadata"].get(field) {
                    obj["metadata"][field] = value.clone();
                }
            }
            if let Some(obj) = obj.as_object_mut() {
                match stored.get("status") {
                    Some(status) => obj.insert("status".to_string(), status.clone()),
                    None => obj.remove("status"),
                };
            }
            if stored["metadata"].get("generation").is_some() && stored.get("spec") != obj.get("spec") {
                let generation = stored["metadata"]["generation"].as_i64().unwrap_or(0);
                obj["metadata"]["generation"] = json!(generation + 1);
            }
            obj
        };
        self.bump_version(&mut updated);

        self.objects.insert(key, updated.clone());
        self.record(method, target, name);
        (StatusCode::OK, updated)
    }

    fn patch(&mut self, method: &Method, target: &Target, name: &str, patch: Value) -> (StatusCode, Value) {
        let key = target.key(name);
        let Some(mut updated) = self.objects.get(&key).cloned() else {
            return not_found(name);
        };

        if target.subresource.as_deref() == Some("status") {
            merge_patch(&mut updated["status"], &patch["status"]);
        } else {
            let spec_before = updated.get("spec").cloned();
            merge_patch(&mut updated, &patch);
            if let Err(invalid) = validate_labels(&updated) {
                return invalid;
            }
            if updated["metadata"].get("generation").is_some() && updated.get("spec").cloned() != spec_before {
                let generation = updated["metadata"]["generation"].as_i64().unwrap_or(0);
                updated["metadata"]["generation"] = json!(generation + 1);
            }
        }
        self.bump_version(&mut updated);

        self.objects.insert(key, updated.clone());
        self.record(method, target, name);
        (StatusCode::OK, updated)
    }
}

/// Handle to the in-memory API server and a client talking to it.
#[derive(Clone)]
pub struct ApiServerHandle {
    store: Arc<Mutex<Store>>,
    client: Client,
}

impl ApiServerHandle {
    /// Spawns the server loop on the current tokio runtime.
    pub fn start() -> Self {
        let (mock_service, mut handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let store = Arc::new(Mutex::new(Store::default()));

        let server_store = store.clone();
        tokio::spawn(async move {
            while let Some((request, send)) = handle.next_request().await {
                let (parts, body) = request.into_parts();
                let body = body.collect_bytes().await.unwrap();
                let (code, response) = server_store
                    .lock()
                    .unwrap()
                    .handle(&parts.method, parts.uri.path(), &body);
                send.send_response(
                    Response::builder()
                        .status(code)
                        .body(Body::from(serde_json::to_vec(&response).unwrap()))
                        .unwrap(),
                );
            }
        });

        Self {
            store,
            client: Client::new(mock_service, NAMESPACE),
        }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Every write issued so far
    pub fn write_log(&self) -> Vec<Write> {
        self.store.lock().unwrap().writes.clone()
    }

    pub fn writes(&self) -> usize {
        self.store.lock().unwrap().writes.len()
    }

    pub fn created(&self) -> usize {
        self.write_log()
            .iter()
            .filter(|write| write.method == Method::POST)
            .count()
    }

    pub fn reset_writes(&self) {
        self.store.lock().unwrap().writes.clear();
    }

    /// Makes every write to the given resource plural fail with a 500.
    pub fn fail_writes_for(&self, resource: &str) {
        self.store.lock().unwrap().failing.push(resource.to_string());
    }

    /// Number of stored objects of the given resource plural
    pub fn count(&self, resource: &str) -> usize {
        self.store
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|key| key.rsplit('/').nth(1) == Some(resource))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_and_cluster_paths() {
        let target = Target::parse("/apis/apps/v1/namespaces/kubevirt/deployments/validator/status").unwrap();
        assert_eq!(target.collection, "/apis/apps/v1/namespaces/kubevirt/deployments");
        assert_eq!(target.namespace.as_deref(), Some("kubevirt"));
        assert_eq!(target.name.as_deref(), Some("validator"));
        assert_eq!(target.subresource.as_deref(), Some("status"));

        let target = Target::parse("/api/v1/namespaces/kubevirt-os-images").unwrap();
        assert_eq!(target.resource, "namespaces");
        assert_eq!(target.namespace, None);
        assert_eq!(target.name.as_deref(), Some("kubevirt-os-images"));

        let target = Target::parse("/apis/rbac.authorization.k8s.io/v1/clusterroles").unwrap();
        assert_eq!(target.resource, "clusterroles");
        assert_eq!(target.name, None);
    }

    #[tokio::test]
    async fn rejects_invalid_label_values() {
        use k8s_openapi::api::rbac::v1::ClusterRole;
        use kube::api::{Api, ObjectMeta, PostParams};

        let server = ApiServerHandle::start();
        let api: Api<ClusterRole> = Api::all(server.client());
        let role = ClusterRole {
            metadata: ObjectMeta {
                name: Some("os-images.kubevirt.io:view".to_string()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/name".to_string(),
                    "os-images.kubevirt.io:view".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &role).await {
            Err(kube::Error::Api(err)) => assert_eq!(err.code, 422),
            other => panic!("expected 422, got {other:?}"),
        }
        assert_eq!(server.count("clusterroles"), 0);
    }

    #[test]
    fn merge_patch_removes_nulls() {
        let mut target = json!({ "a": 1, "b": { "c": 2, "d": 3 } });
        merge_patch(&mut target, &json!({ "a": null, "b": { "c": 5 } }));
        assert_eq!(target, json!({ "b": { "c": 5, "d": 3 } }));
    }
}
