// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory API server behind a kube Client.
//!
//! The server keeps objects keyed by (api prefix, plural, namespace, name),
//! assigns resourceVersions, answers 409 on stale writes, honours finalizers on
//! delete, and logs every request so tests can count writes.

use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    prefix: String,
    plural: String,
    namespace: Option<String>,
    name: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    next_version: u64,
    requests: Vec<(Method, String)>,
    injected: HashMap<(Method, String), u16>,
    served: Vec<ServedKind>,
}

/// A kind advertised through discovery
#[derive(Clone)]
struct ServedKind {
    group: String,
    version: String,
    kind: String,
    plural: String,
}

fn discovery_response(served: &[ServedKind], path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["apis"] => {
            let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for s in served {
                groups.entry(&s.group).or_default().push(&s.version);
            }
            let groups: Vec<Value> = groups
                .into_iter()
                .map(|(group, versions)| {
                    let versions: Vec<Value> = versions
                        .iter()
                        .map(|v| json!({"groupVersion": format!("{}/{}", group, v), "version": v}))
                        .collect();
                    json!({"name": group, "versions": versions, "preferredVersion": versions[0]})
                })
                .collect();
            Some(json!({"kind": "APIGroupList", "apiVersion": "v1", "groups": groups}))
        }
        ["api"] => Some(json!({"kind": "APIVersions", "versions": ["v1"], "serverAddressByClientCIDRs": []})),
        ["apis", group, version] => {
            let resources: Vec<Value> = served
                .iter()
                .filter(|s| s.group == *group && s.version == *version)
                .map(|s| {
                    json!({
                        "name": s.plural, "singularName": "", "namespaced": true,
                        "kind": s.kind, "verbs": ["get", "list", "watch"]
                    })
                })
                .collect();
            Some(json!({
                "kind": "APIResourceList", "apiVersion": "v1",
                "groupVersion": format!("{}/{}", group, version),
                "resources": resources
            }))
        }
        _ => None,
    }
}

/// Parsed request path
struct Target {
    prefix: String,
    plural: String,
    namespace: Option<String>,
    name: Option<String>,
    status: bool,
}

fn parse_path(path: &str) -> Option<Target> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (prefix, rest) = match segments.as_slice() {
        ["api", version, rest @ ..] => (format!("api/{}", version), rest),
        ["apis", group, version, rest @ ..] => (format!("apis/{}/{}", group, version), rest),
        _ => return None,
    };
    let (namespace, rest) = match rest {
        ["namespaces", ns, tail @ ..] if !tail.is_empty() => (Some(ns.to_string()), tail),
        other => (None, other),
    };
    let (plural, name, status) = match rest {
        [plural] => (plural.to_string(), None, false),
        [plural, name] => (plural.to_string(), Some(name.to_string()), false),
        [plural, name, "status"] => (plural.to_string(), Some(name.to_string()), true),
        _ => return None,
    };
    Some(Target {
        prefix,
        plural,
        namespace,
        name,
        status,
    })
}

fn status_json(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
}

fn reason_for(code: u16) -> &'static str {
    match code {
        404 => "NotFound",
        409 => "Conflict",
        422 => "Invalid",
        _ => "InternalError",
    }
}

fn matches_selector(obj: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        return true;
    };
    selector.split(',').all(|term| {
        let Some((k, v)) = term.split_once('=') else {
            return false;
        };
        obj.pointer("/metadata/labels")
            .and_then(|l| l.get(k))
            .and_then(Value::as_str)
            == Some(v)
    })
}

fn has_finalizers(obj: &Value) -> bool {
    obj.pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty())
}

/// A stateful fake of the Kubernetes API server.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a kube Client talking to this server
    pub fn client(&self) -> Client {
        Client::new(self.clone(), "default")
    }

    /// Store an object directly, bypassing the request log.
    /// `path` is the collection path, e.g. `/api/v1/namespaces/ns/secrets`.
    pub fn seed(&self, collection: &str, mut obj: Value) {
        let target = parse_path(collection).expect("valid collection path");
        let name = obj["metadata"]["name"].as_str().expect("object name").to_string();
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        obj["metadata"]["resourceVersion"] = json!(state.next_version.to_string());
        if let Some(ns) = &target.namespace {
            obj["metadata"]["namespace"] = json!(ns);
        }
        let key = Key {
            prefix: target.prefix,
            plural: target.plural,
            namespace: target.namespace,
            name,
        };
        state.objects.insert(key, obj);
    }

    /// Advertise `kind` under `group/version` in API discovery
    pub fn serve_kind(&self, group: &str, version: &str, kind: &str, plural: &str) {
        self.state.lock().unwrap().served.push(ServedKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        });
    }

    /// Current object at an object path, e.g. `/api/v1/namespaces/ns/secrets/name`
    pub fn get(&self, path: &str) -> Option<Value> {
        let key = self.key_for(path)?;
        self.state.lock().unwrap().objects.get(&key).cloned()
    }

    /// Mutate a stored object in place, bumping its resourceVersion
    pub fn mutate(&self, path: &str, f: impl FnOnce(&mut Value)) {
        let key = self.key_for(path).expect("object path");
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        let version = state.next_version.to_string();
        let obj = state.objects.get_mut(&key).expect("object exists");
        f(obj);
        obj["metadata"]["resourceVersion"] = json!(version);
    }

    /// Names of every object stored under a collection path
    pub fn names(&self, collection: &str) -> Vec<String> {
        let Some(target) = parse_path(collection) else {
            return Vec::new();
        };
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|k| {
                k.prefix == target.prefix
                    && k.plural == target.plural
                    && (target.namespace.is_none() || k.namespace == target.namespace)
            })
            .map(|k| k.name.clone())
            .collect()
    }

    /// Make the next request with this method and path fail with `code`
    pub fn fail_next(&self, method: Method, path: &str, code: u16) {
        self.state
            .lock()
            .unwrap()
            .injected
            .insert((method, path.to_string()), code);
    }

    /// Every (method, path) seen so far
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of mutating requests seen so far
    pub fn writes(&self) -> usize {
        self.requests()
            .iter()
            .filter(|(m, _)| *m != Method::GET)
            .count()
    }

    /// Forget the request log
    pub fn reset_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    fn key_for(&self, path: &str) -> Option<Key> {
        let target = parse_path(path)?;
        Some(Key {
            prefix: target.prefix,
            plural: target.plural,
            namespace: target.namespace,
            name: target.name?,
        })
    }

    fn handle(&self, method: Method, path: &str, query: &str, body: &[u8]) -> (u16, Value) {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.clone(), path.to_string()));

        if let Some(code) = state.injected.remove(&(method.clone(), path.to_string())) {
            return (code, status_json(code, reason_for(code), "injected failure"));
        }

        if method == Method::GET {
            if let Some(discovery) = discovery_response(&state.served, path) {
                return (200, discovery);
            }
        }

        let Some(target) = parse_path(path) else {
            return (404, status_json(404, "NotFound", "unknown path"));
        };
        let selector: Option<String> = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "labelSelector")
            .map(|(_, v)| v.into_owned());

        let Some(name) = target.name.clone() else {
            if method != Method::POST {
                let items: Vec<Value> = state
                    .objects
                    .iter()
                    .filter(|(k, _)| {
                        k.prefix == target.prefix
                            && k.plural == target.plural
                            && (target.namespace.is_none() || k.namespace == target.namespace)
                    })
                    .map(|(_, v)| v.clone())
                    .filter(|v| matches_selector(v, selector.as_deref()))
                    .collect();
                let list = json!({
                    "apiVersion": "v1",
                    "kind": "List",
                    "metadata": {"resourceVersion": state.next_version.to_string()},
                    "items": items,
                });
                return (200, list);
            }
            return Self::create(&mut state, target, body);
        };

        let key = Key {
            prefix: target.prefix.clone(),
            plural: target.plural.clone(),
            namespace: target.namespace.clone(),
            name: name.clone(),
        };

        match method {
            Method::GET => match state.objects.get(&key) {
                Some(obj) => (200, obj.clone()),
                None => (404, status_json(404, "NotFound", &format!("{} \"{}\" not found", key.plural, name))),
            },
            Method::PUT => Self::replace(&mut state, key, target.status, body),
            Method::DELETE => {
                let Some(obj) = state.objects.get(&key).cloned() else {
                    return (404, status_json(404, "NotFound", &format!("{} \"{}\" not found", key.plural, name)));
                };
                if has_finalizers(&obj) {
                    state.next_version += 1;
                    let version = state.next_version.to_string();
                    let stored = state.objects.get_mut(&key).expect("present");
                    stored["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
                    stored["metadata"]["resourceVersion"] = json!(version);
                    (200, stored.clone())
                } else {
                    state.objects.remove(&key);
                    (200, obj)
                }
            }
            _ => (405, status_json(405, "MethodNotAllowed", "unsupported")),
        }
    }

    fn create(state: &mut State, target: Target, body: &[u8]) -> (u16, Value) {
        let mut obj: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return (422, status_json(422, "Invalid", &e.to_string())),
        };
        let Some(name) = obj.pointer("/metadata/name").and_then(Value::as_str).map(String::from) else {
            return (422, status_json(422, "Invalid", "name is required"));
        };
        let key = Key {
            prefix: target.prefix,
            plural: target.plural,
            namespace: target.namespace,
            name: name.clone(),
        };
        if state.objects.contains_key(&key) {
            return (409, status_json(409, "AlreadyExists", &format!("{} \"{}\" already exists", key.plural, name)));
        }
        state.next_version += 1;
        obj["metadata"]["resourceVersion"] = json!(state.next_version.to_string());
        obj["metadata"]["uid"] = json!(format!("uid-{}", state.next_version));
        obj["metadata"]["creationTimestamp"] = json!("2026-01-01T00:00:00Z");
        obj["metadata"]["generation"] = json!(1);
        if let Some(ns) = &key.namespace {
            obj["metadata"]["namespace"] = json!(ns);
        }
        state.objects.insert(key, obj.clone());
        (201, obj)
    }

    fn replace(state: &mut State, key: Key, status_only: bool, body: &[u8]) -> (u16, Value) {
        let incoming: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return (422, status_json(422, "Invalid", &e.to_string())),
        };
        let Some(current) = state.objects.get(&key).cloned() else {
            return (404, status_json(404, "NotFound", &format!("{} \"{}\" not found", key.plural, key.name)));
        };
        let current_version = current.pointer("/metadata/resourceVersion").cloned();
        if let Some(sent) = incoming.pointer("/metadata/resourceVersion") {
            if Some(sent) != current_version.as_ref() {
                return (409, status_json(409, "Conflict", "the object has been modified"));
            }
        }

        let mut updated = if status_only {
            let mut obj = current.clone();
            obj["status"] = incoming.get("status").cloned().unwrap_or(Value::Null);
            obj
        } else {
            let mut obj = incoming;
            // the main resource never writes status
            match current.get("status") {
                Some(status) => obj["status"] = status.clone(),
                None => {
                    if let Some(map) = obj.as_object_mut() {
                        map.remove("status");
                    }
                }
            }
            for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
                if let Some(v) = current["metadata"].get(field) {
                    obj["metadata"][field] = v.clone();
                }
            }
            if obj.get("spec") != current.get("spec") {
                let generation = current["metadata"]["generation"].as_i64().unwrap_or(1) + 1;
                obj["metadata"]["generation"] = json!(generation);
            } else if let Some(g) = current["metadata"].get("generation") {
                obj["metadata"]["generation"] = g.clone();
            }
            obj
        };

        if updated.pointer("/metadata/deletionTimestamp").is_some() && !has_finalizers(&updated) {
            state.objects.remove(&key);
            return (200, updated);
        }

        state.next_version += 1;
        updated["metadata"]["resourceVersion"] = json!(state.next_version.to_string());
        if let Some(ns) = &key.namespace {
            updated["metadata"]["namespace"] = json!(ns);
        }
        state.objects.insert(key, updated.clone());
        (200, updated)
    }
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.clone();
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.uri().path().to_string();
            let query = req.uri().query().unwrap_or_default().to_string();
            let body: Bytes = req.into_body().collect().await?.to_bytes();

            let (status, payload) = server.handle(method, &path, &query, &body);
            let response = Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&payload)?))?;
            Ok(response)
        })
    }
}

/// Collection path for a namespaced core resource
pub fn core_path(namespace: &str, plural: &str) -> String {
    format!("/api/v1/namespaces/{}/{}", namespace, plural)
}

/// Collection path for a namespaced resource of an API group
pub fn group_path(group_version: &str, namespace: &str, plural: &str) -> String {
    format!("/apis/{}/namespaces/{}/{}", group_version, namespace, plural)
}

/// A ready Deployment as the API server would report it
pub fn ready_deployment_json(name: &str, namespace: &str, ready: i32) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"selector": {}, "template": {}},
        "status": {"readyReplicas": ready}
    })
}

/// A StatefulSet as the API server would report it
pub fn ready_statefulset_json(name: &str, namespace: &str, ready: i32) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"selector": {}, "serviceName": name, "template": {}},
        "status": {"replicas": ready, "readyReplicas": ready}
    })
}

/// A Secret with plain-text values, base64 encoded the way the API returns them
pub fn secret_json(name: &str, namespace: &str, data: &[(&str, &str)]) -> Value {
    use base64::Engine;
    let data: serde_json::Map<String, Value> = data
        .iter()
        .map(|(k, v)| {
            (
                k.to_string(),
                json!(base64::engine::general_purpose::STANDARD.encode(v)),
            )
        })
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": namespace},
        "type": "Opaque",
        "data": data
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespaced_object_path() {
        let t = parse_path("/apis/apps/v1/namespaces/obs/deployments/query").unwrap();
        assert_eq!(t.prefix, "apis/apps/v1");
        assert_eq!(t.plural, "deployments");
        assert_eq!(t.namespace.as_deref(), Some("obs"));
        assert_eq!(t.name.as_deref(), Some("query"));
        assert!(!t.status);
    }

    #[test]
    fn test_parse_cluster_scoped_paths() {
        let ns = parse_path("/api/v1/namespaces/obs").unwrap();
        assert_eq!(ns.plural, "namespaces");
        assert_eq!(ns.name.as_deref(), Some("obs"));
        assert!(ns.namespace.is_none());

        let status = parse_path("/apis/observability.lookout.dev/v1beta2/multiclusterobservabilities/mco/status").unwrap();
        assert!(status.status);
        assert_eq!(status.name.as_deref(), Some("mco"));
    }

    #[test]
    fn test_selector_matching() {
        let obj = json!({"metadata": {"labels": {"a": "b", "c": "d"}}});
        assert!(matches_selector(&obj, Some("a=b,c=d")));
        assert!(!matches_selector(&obj, Some("a=x")));
        assert!(matches_selector(&obj, None));
    }
}
