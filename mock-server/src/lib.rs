//! In-memory stand-in for the CI server's remote API.
//!
//! # Overview
//! Serves the subset of the server's HTTP surface the client drives: the
//! root record, jobs nested in folders, builds and their console text,
//! agents, views, the build queue, plugins and fingerprints. Structured
//! reads answer on `<path>/api/json`; `config.xml` and `consoleText` are
//! raw documents. Every response carries an `X-Jenkins` version header.
//!
//! # Design
//! - One fallback handler serves every path. The path is normalized (no
//!   slash at either end, no `api/json` suffix) and matched by hand, the
//!   way the server resolves nested `job/<name>` segments.
//! - Tests reach into the shared [`Registry`] to seed state, inject one-shot
//!   faults and read back every request the client sent.
//! - A fault either answers instead of the handler (`apply = false`) or runs
//!   the handler first and then answers with the fault status
//!   (`apply = true`), which is how a server that commits a change but
//!   reports an error looks from the outside.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Value of the `X-Jenkins` header.
pub const VERSION: &str = "2.462.3";
pub const FOLDER_CLASS: &str = "com.cloudbees.hudson.plugins.folder.Folder";
pub const JOB_CLASS: &str = "hudson.model.FreeStyleProject";
pub const LIST_VIEW_CLASS: &str = "hudson.model.ListView";
const ALL_VIEW_CLASS: &str = "hudson.model.AllView";
const JNLP_LAUNCHER: &str = "hudson.slaves.JNLPLauncher";
const BUILT_IN: &str = "(built-in)";

pub type Db = Arc<RwLock<Registry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Job,
    Folder,
}

#[derive(Debug, Clone)]
pub struct Item {
    pub kind: ItemKind,
    pub description: Option<String>,
    pub config_xml: String,
    pub disabled: bool,
    pub builds: Vec<Build>,
}

impl Item {
    pub fn job(config_xml: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Job,
            description: None,
            config_xml: config_xml.into(),
            disabled: false,
            builds: Vec::new(),
        }
    }

    pub fn folder() -> Self {
        Self {
            kind: ItemKind::Folder,
            ..Self::job("<com.cloudbees.hudson.plugins.folder.Folder/>")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub number: u64,
    pub queue_id: u64,
    pub params: BTreeMap<String, String>,
    pub console: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub display_name: String,
    pub description: String,
    pub num_executors: u32,
    pub idle: bool,
    pub offline: bool,
    pub temporarily_offline: bool,
    pub jnlp_agent: bool,
    pub offline_cause_reason: String,
    #[serde(skip)]
    pub labels: String,
    #[serde(skip)]
    pub launcher: String,
    #[serde(skip)]
    pub connected: bool,
}

impl Node {
    fn built_in() -> Self {
        Self {
            display_name: "Built-In Node".to_string(),
            description: "the built-in node".to_string(),
            num_executors: 2,
            idle: true,
            offline: false,
            temporarily_offline: false,
            jnlp_agent: false,
            offline_cause_reason: String::new(),
            labels: String::new(),
            launcher: String::new(),
            connected: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct View {
    pub class: String,
    pub jobs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedBuild {
    pub id: u64,
    pub item: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub short_name: String,
    pub long_name: String,
    pub version: String,
    pub active: bool,
    pub enabled: bool,
    pub has_update: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub hash: String,
    pub file_name: String,
    pub timestamp: u64,
    pub original: Option<FingerprintOrigin>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FingerprintOrigin {
    pub name: String,
    pub number: u64,
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// A request as the fixture saw it. `path` is normalized, `query` decoded.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone)]
struct Fault {
    method: String,
    path: String,
    status: u16,
    apply: bool,
}

#[derive(Debug)]
pub struct Registry {
    /// Keyed by normalized item path, e.g. `job/team/job/alpha`.
    pub items: BTreeMap<String, Item>,
    /// Keyed by the path segment under `/computer`.
    pub nodes: BTreeMap<String, Node>,
    pub views: BTreeMap<String, View>,
    pub queue: Vec<QueuedBuild>,
    pub plugins: Vec<Plugin>,
    pub fingerprints: HashMap<String, Fingerprint>,
    pub requests: Vec<RecordedRequest>,
    faults: Vec<Fault>,
    required_auth: Option<String>,
    next_queue_id: u64,
}

impl Default for Registry {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(BUILT_IN.to_string(), Node::built_in());
        let mut views = BTreeMap::new();
        views.insert(
            "all".to_string(),
            View {
                class: ALL_VIEW_CLASS.to_string(),
                jobs: Vec::new(),
            },
        );
        Self {
            items: BTreeMap::new(),
            nodes,
            views,
            queue: Vec::new(),
            plugins: Vec::new(),
            fingerprints: HashMap::new(),
            requests: Vec::new(),
            faults: Vec::new(),
            required_auth: None,
            next_queue_id: 1,
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Db {
        Arc::new(RwLock::new(self))
    }

    /// Answer 401 to every request without these basic credentials.
    pub fn require_credentials(&mut self, username: &str, password: &str) {
        let token = STANDARD.encode(format!("{username}:{password}"));
        self.required_auth = Some(format!("Basic {token}"));
    }

    /// Answer the next `method` request on normalized `path` with `status`.
    /// With `apply`, the request is handled first and its reply discarded.
    pub fn inject_fault(&mut self, method: &str, path: &str, status: u16, apply: bool) {
        self.faults.push(Fault {
            method: method.to_ascii_uppercase(),
            path: normalize(path),
            status,
            apply,
        });
    }

    pub fn add_job(&mut self, path: &str, config_xml: &str) {
        self.items.insert(normalize(path), Item::job(config_xml));
    }

    pub fn add_folder(&mut self, path: &str) {
        self.items.insert(normalize(path), Item::folder());
    }

    pub fn add_plugin(&mut self, short_name: &str, version: &str) {
        self.plugins.push(Plugin {
            short_name: short_name.to_string(),
            long_name: short_name.to_string(),
            version: version.to_string(),
            active: true,
            enabled: true,
            has_update: false,
        });
    }

    pub fn add_fingerprint(&mut self, hash: &str, file_name: &str, origin: Option<(&str, u64)>) {
        self.fingerprints.insert(
            hash.to_string(),
            Fingerprint {
                hash: hash.to_string(),
                file_name: file_name.to_string(),
                timestamp: 0,
                original: origin.map(|(name, number)| FingerprintOrigin {
                    name: name.to_string(),
                    number,
                }),
            },
        );
    }

    pub fn item(&self, path: &str) -> Option<&Item> {
        self.items.get(&normalize(path))
    }

    /// Recorded requests for `method` on normalized `path`, oldest first.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<&RecordedRequest> {
        let path = normalize(path);
        self.requests
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .collect()
    }

    fn serve(&mut self, call: &Call) -> Reply {
        if let Some(expected) = &self.required_auth {
            if call.authorization.as_deref() != Some(expected.as_str()) {
                return Reply::status(401);
            }
        }
        let fault = self
            .faults
            .iter()
            .position(|fault| fault.method == call.method.as_str() && fault.path == call.path);
        if let Some(index) = fault {
            let fault = self.faults.remove(index);
            if fault.apply {
                self.route(call);
            }
            return Reply::status(fault.status);
        }
        self.route(call)
    }

    fn route(&mut self, call: &Call) -> Reply {
        let segments: Vec<&str> = if call.path.is_empty() {
            Vec::new()
        } else {
            call.path.split('/').collect()
        };
        match (&call.method, segments.as_slice()) {
            (&Method::GET, []) => self.root_info(),
            (&Method::POST, ["createItem"]) => self.create_item("", call),
            (&Method::POST, ["createView"]) => self.create_view(call),
            (&Method::GET, ["queue"]) => self.queue_info(),
            (&Method::POST, ["queue", "cancelItem"]) => self.cancel_queue_item(call),
            (&Method::GET, ["pluginManager"]) => Reply::json(json!({ "plugins": self.plugins })),
            (&Method::POST, ["pluginManager", "uploadPlugin"]) => self.upload_plugin(call),
            (&Method::GET, ["fingerprint", hash]) => match self.fingerprints.get(*hash) {
                Some(fingerprint) => Reply::json(json!(fingerprint)),
                None => Reply::status(404),
            },
            (&Method::GET, ["computer"]) => self.computer_list(),
            (&Method::POST, ["computer", "doCreateItem"]) => self.create_node(call),
            (_, ["computer", name, rest @ ..]) => self.route_node(&call.method, name, rest, call),
            (_, ["view", name, rest @ ..]) => self.route_view(&call.method, name, rest, call),
            (_, ["job", ..]) => self.route_item(&segments, call),
            _ => Reply::status(404),
        }
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    fn route_item(&mut self, segments: &[&str], call: &Call) -> Reply {
        let mut key = String::new();
        let mut index = 0;
        while index + 1 < segments.len() && segments[index] == "job" {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str("job/");
            key.push_str(segments[index + 1]);
            index += 2;
        }
        let Some(kind) = self.items.get(&key).map(|item| item.kind) else {
            return Reply::status(404);
        };

        match (&call.method, &segments[index..]) {
            (&Method::GET, []) => self.item_info(&key),
            (&Method::DELETE, []) | (&Method::POST, ["doDelete"]) => self.delete_item(&key),
            (&Method::POST, ["createItem"]) if kind == ItemKind::Folder => {
                self.create_item(&key, call)
            }
            (&Method::GET, ["config.xml"]) => match self.items.get(&key) {
                Some(item) => Reply::xml(item.config_xml.clone()),
                None => Reply::status(404),
            },
            (&Method::POST, ["config.xml"]) => {
                if let Some(item) = self.items.get_mut(&key) {
                    item.config_xml = String::from_utf8_lossy(&call.body).into_owned();
                }
                Reply::status(200)
            }
            (&Method::POST, ["doRename"]) => self.rename_item(&key, call),
            (&Method::POST, ["enable"]) => self.set_disabled(&key, false),
            (&Method::POST, ["disable"]) => self.set_disabled(&key, true),
            (&Method::POST, ["build" | "buildWithParameters"]) if kind == ItemKind::Job => {
                self.trigger_build(&key, call)
            }
            (&Method::GET, [number]) => self.build_info(&key, number),
            (&Method::GET, [number, "consoleText"]) => self.console_text(&key, number),
            _ => Reply::status(404),
        }
    }

    fn create_item(&mut self, parent: &str, call: &Call) -> Reply {
        let Some(name) = call.query.get("name") else {
            return Reply::status(400);
        };
        let key = item_key(parent, name);
        if self.items.contains_key(&key) {
            return Reply::status(400);
        }
        let item = match call.query.get("mode").map(String::as_str) {
            Some("copy") => {
                let source = call
                    .query
                    .get("from")
                    .and_then(|from| self.items.get(&item_key(parent, from)));
                match source {
                    Some(source) => Item {
                        builds: Vec::new(),
                        ..source.clone()
                    },
                    None => return Reply::status(404),
                }
            }
            Some(FOLDER_CLASS) => Item::folder(),
            Some(_) => return Reply::status(400),
            None => Item::job(String::from_utf8_lossy(&call.body)),
        };
        self.items.insert(key, item);
        Reply::status(200)
    }

    fn delete_item(&mut self, key: &str) -> Reply {
        let nested = format!("{key}/");
        self.items
            .retain(|path, _| path != key && !path.starts_with(&nested));
        Reply::status(200)
    }

    fn rename_item(&mut self, key: &str, call: &Call) -> Reply {
        let Some(new_name) = call.query.get("newName") else {
            return Reply::status(400);
        };
        let parent = key.rsplit_once("/job/").map_or("", |(parent, _)| parent);
        let new_key = item_key(parent, new_name);
        if self.items.contains_key(&new_key) {
            return Reply::status(400);
        }
        let nested = format!("{key}/");
        let moved: Vec<String> = self
            .items
            .keys()
            .filter(|path| path.as_str() == key || path.starts_with(&nested))
            .cloned()
            .collect();
        for path in moved {
            if let Some(item) = self.items.remove(&path) {
                let renamed = format!("{new_key}{}", &path[key.len()..]);
                self.items.insert(renamed, item);
            }
        }
        Reply::status(200)
    }

    fn set_disabled(&mut self, key: &str, disabled: bool) -> Reply {
        match self.items.get_mut(key) {
            Some(item) if item.kind == ItemKind::Job && item.disabled != disabled => {
                item.disabled = disabled;
                Reply::status(200)
            }
            Some(_) => Reply::status(400),
            None => Reply::status(404),
        }
    }

    fn trigger_build(&mut self, key: &str, call: &Call) -> Reply {
        let queue_id = self.next_queue_id;
        let Some(item) = self.items.get_mut(key) else {
            return Reply::status(404);
        };
        if item.disabled {
            return Reply::status(409);
        }

        let mut params: BTreeMap<String, String> = call
            .query
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for part in &call.parts {
            let value = match &part.file_name {
                Some(file_name) => file_name.clone(),
                None => String::from_utf8_lossy(&part.bytes).into_owned(),
            };
            params.insert(part.name.clone(), value);
        }

        let number = item.builds.last().map_or(1, |build| build.number + 1);
        let mut console = String::from("Started by remote API\n");
        for (name, value) in &params {
            console.push_str(&format!("{name}={value}\n"));
        }
        console.push_str("Finished: SUCCESS\n");
        item.builds.push(Build {
            number,
            queue_id,
            params,
            console,
        });

        self.next_queue_id += 1;
        self.queue.push(QueuedBuild {
            id: queue_id,
            item: key.to_string(),
        });
        Reply {
            location: Some(format!("/queue/item/{queue_id}/")),
            ..Reply::status(201)
        }
    }

    fn find_build(&self, key: &str, number: &str) -> Option<&Build> {
        let number: u64 = number.parse().ok()?;
        self.items
            .get(key)?
            .builds
            .iter()
            .find(|build| build.number == number)
    }

    fn build_info(&self, key: &str, number: &str) -> Reply {
        match self.find_build(key, number) {
            Some(build) => Reply::json(json!({
                "_class": "hudson.model.FreeStyleBuild",
                "number": build.number,
                "id": build.number.to_string(),
                "displayName": format!("#{}", build.number),
                "url": format!("/{key}/{}/", build.number),
                "building": false,
                "result": "SUCCESS",
                "duration": 1,
                "estimatedDuration": 1,
                "timestamp": 0,
                "queueId": build.queue_id,
            })),
            None => Reply::status(404),
        }
    }

    fn console_text(&self, key: &str, number: &str) -> Reply {
        match self.find_build(key, number) {
            Some(build) => Reply::text(build.console.clone()),
            None => Reply::status(404),
        }
    }

    fn item_info(&self, key: &str) -> Reply {
        let Some(item) = self.items.get(key) else {
            return Reply::status(404);
        };
        let name = item_name(key);
        let full_name: Vec<&str> = key.split('/').skip(1).step_by(2).collect();
        let url = format!("/{key}/");
        match item.kind {
            ItemKind::Folder => Reply::json(json!({
                "_class": FOLDER_CLASS,
                "name": name,
                "fullName": full_name.join("/"),
                "displayName": name,
                "description": item.description,
                "url": url,
                "jobs": self.children(key),
                "views": [{ "name": "All", "url": url }],
                "primaryView": { "name": "All", "url": url },
            })),
            ItemKind::Job => {
                let build_ref = |build: &Build| {
                    json!({ "number": build.number, "url": format!("/{key}/{}/", build.number) })
                };
                let builds: Vec<Value> = item.builds.iter().rev().map(build_ref).collect();
                let last = item.builds.last().map(build_ref);
                Reply::json(json!({
                    "_class": JOB_CLASS,
                    "name": name,
                    "fullName": full_name.join("/"),
                    "displayName": name,
                    "description": item.description,
                    "url": url,
                    "color": if item.disabled { "disabled" } else { "blue" },
                    "buildable": !item.disabled,
                    "inQueue": false,
                    "builds": builds,
                    "allBuilds": builds,
                    "firstBuild": item.builds.first().map(build_ref),
                    "lastBuild": last,
                    "lastCompletedBuild": last,
                    "lastSuccessfulBuild": last,
                    "lastFailedBuild": null,
                    "nextBuildNumber": item.builds.last().map_or(1, |build| build.number + 1),
                }))
            }
        }
    }

    /// Direct children of `parent` (`""` for the root) as job references.
    fn children(&self, parent: &str) -> Vec<Value> {
        let prefix = if parent.is_empty() {
            "job/".to_string()
        } else {
            format!("{parent}/job/")
        };
        self.items
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .map(|(path, item)| job_ref(path, item))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Root, queue, plugins
    // -----------------------------------------------------------------------

    fn root_info(&self) -> Reply {
        let views: Vec<Value> = self
            .views
            .keys()
            .map(|name| json!({ "name": name, "url": format!("/view/{name}/") }))
            .collect();
        Reply::json(json!({
            "_class": "hudson.model.Hudson",
            "mode": "NORMAL",
            "nodeDescription": "the built-in node",
            "numExecutors": 2,
            "jobs": self.children(""),
            "views": views,
            "primaryView": { "name": "all", "url": "/" },
            "useSecurity": self.required_auth.is_some(),
        }))
    }

    fn queue_info(&self) -> Reply {
        let items: Vec<Value> = self
            .queue
            .iter()
            .map(|queued| {
                let task = match self.items.get(&queued.item) {
                    Some(item) => job_ref(&queued.item, item),
                    None => json!({ "name": item_name(&queued.item) }),
                };
                json!({
                    "id": queued.id,
                    "why": "Waiting for next available executor",
                    "blocked": false,
                    "buildable": true,
                    "stuck": false,
                    "inQueueSince": 0,
                    "params": "",
                    "task": task,
                })
            })
            .collect();
        Reply::json(json!({ "items": items }))
    }

    fn cancel_queue_item(&mut self, call: &Call) -> Reply {
        let id: Option<u64> = call.query.get("id").and_then(|id| id.parse().ok());
        let before = self.queue.len();
        self.queue.retain(|queued| Some(queued.id) != id);
        if self.queue.len() < before {
            Reply::status(204)
        } else {
            Reply::status(404)
        }
    }

    fn upload_plugin(&mut self, call: &Call) -> Reply {
        let archive = call
            .parts
            .iter()
            .find(|part| part.name == "file")
            .and_then(|part| part.file_name.as_deref());
        let Some(archive) = archive else {
            return Reply::status(400);
        };
        let short_name = archive
            .rsplit_once('.')
            .map_or(archive, |(stem, _)| stem)
            .to_string();
        self.plugins.push(Plugin {
            long_name: short_name.clone(),
            short_name,
            version: "1.0".to_string(),
            active: false,
            enabled: true,
            has_update: false,
        });
        Reply::status(200)
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    fn computer_list(&self) -> Reply {
        let total: u32 = self.nodes.values().map(|node| node.num_executors).sum();
        let computers: Vec<&Node> = self.nodes.values().collect();
        Reply::json(json!({
            "busyExecutors": 0,
            "totalExecutors": total,
            "computer": computers,
        }))
    }

    fn create_node(&mut self, call: &Call) -> Reply {
        let (Some(name), Some(_), Some(form)) = (
            call.query.get("name"),
            call.query.get("type"),
            call.query.get("json"),
        ) else {
            return Reply::status(400);
        };
        if self.nodes.contains_key(name) {
            return Reply::status(400);
        }
        let Ok(form) = serde_json::from_str::<Value>(form) else {
            return Reply::status(400);
        };

        let text = |key: &str| form[key].as_str().unwrap_or_default().to_string();
        let num_executors = match &form["numExecutors"] {
            Value::Number(number) => number.as_u64(),
            Value::String(number) => number.parse().ok(),
            _ => None,
        };
        let launcher = form["launcher"]["stapler-class"]
            .as_str()
            .unwrap_or(JNLP_LAUNCHER)
            .to_string();
        self.nodes.insert(
            name.clone(),
            Node {
                display_name: name.clone(),
                description: text("nodeDescription"),
                num_executors: num_executors.map_or(1, |n| n as u32),
                idle: true,
                offline: true,
                temporarily_offline: false,
                jnlp_agent: launcher == JNLP_LAUNCHER,
                offline_cause_reason: String::new(),
                labels: text("labelString"),
                launcher,
                connected: false,
            },
        );
        Reply::status(200)
    }

    fn route_node(&mut self, method: &Method, name: &str, rest: &[&str], call: &Call) -> Reply {
        match (method, rest) {
            (&Method::GET, []) => match self.nodes.get(name) {
                Some(node) => Reply::json(json!(node)),
                None => Reply::status(404),
            },
            (&Method::POST, ["doDelete"]) if name == BUILT_IN => Reply::status(400),
            (&Method::POST, ["doDelete"]) => match self.nodes.remove(name) {
                Some(_) => Reply::status(200),
                None => Reply::status(404),
            },
            (&Method::POST, ["toggleOffline"]) => match self.nodes.get_mut(name) {
                Some(node) => {
                    node.temporarily_offline = !node.temporarily_offline;
                    node.offline = node.temporarily_offline || !node.connected;
                    node.offline_cause_reason = if node.temporarily_offline {
                        call.query.get("offlineMessage").cloned().unwrap_or_default()
                    } else {
                        String::new()
                    };
                    Reply::status(200)
                }
                None => Reply::status(404),
            },
            _ => Reply::status(404),
        }
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    fn create_view(&mut self, call: &Call) -> Reply {
        let (Some(name), Some(mode)) = (call.query.get("name"), call.query.get("mode")) else {
            return Reply::status(400);
        };
        if self.views.contains_key(name) {
            return Reply::status(400);
        }
        self.views.insert(
            name.clone(),
            View {
                class: mode.clone(),
                jobs: Vec::new(),
            },
        );
        Reply::status(200)
    }

    fn route_view(&mut self, method: &Method, name: &str, rest: &[&str], call: &Call) -> Reply {
        match (method, rest) {
            (&Method::GET, []) => self.view_info(name),
            (&Method::POST, ["addJobToView"]) => {
                let Some(job) = call.query.get("name") else {
                    return Reply::status(400);
                };
                if !self.items.contains_key(&item_key("", job)) {
                    return Reply::status(404);
                }
                match self.views.get_mut(name) {
                    Some(view) => {
                        if !view.jobs.contains(job) {
                            view.jobs.push(job.clone());
                        }
                        Reply::status(200)
                    }
                    None => Reply::status(404),
                }
            }
            _ => Reply::status(404),
        }
    }

    fn view_info(&self, name: &str) -> Reply {
        let Some(view) = self.views.get(name) else {
            return Reply::status(404);
        };
        let jobs: Vec<Value> = if view.class == ALL_VIEW_CLASS {
            self.children("")
        } else {
            view.jobs
                .iter()
                .filter_map(|job| {
                    let key = item_key("", job);
                    self.items.get(&key).map(|item| job_ref(&key, item))
                })
                .collect()
        };
        Reply::json(json!({
            "_class": view.class,
            "name": name,
            "description": null,
            "url": format!("/view/{name}/"),
            "jobs": jobs,
        }))
    }
}

/// Strip slashes at both ends and the structured `api/json` suffix, then
/// percent-decode each segment.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    let trimmed = trimmed.strip_suffix("api/json").unwrap_or(trimmed);
    trimmed
        .trim_end_matches('/')
        .split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn item_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        format!("job/{name}")
    } else {
        format!("{parent}/job/{name}")
    }
}

fn item_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or_default()
}

fn job_ref(key: &str, item: &Item) -> Value {
    let class = match item.kind {
        ItemKind::Job => JOB_CLASS,
        ItemKind::Folder => FOLDER_CLASS,
    };
    let color = match (item.kind, item.disabled) {
        (ItemKind::Folder, _) => Value::Null,
        (ItemKind::Job, true) => json!("disabled"),
        (ItemKind::Job, false) => json!("blue"),
    };
    json!({ "_class": class, "name": item_name(key), "url": format!("/{key}/"), "color": color })
}

/// Everything the registry needs from one HTTP request.
struct Call {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
    body: Bytes,
    parts: Vec<Part>,
}

struct Reply {
    status: u16,
    content_type: Option<&'static str>,
    body: Vec<u8>,
    location: Option<String>,
}

impl Reply {
    fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
            location: None,
        }
    }

    fn json(value: Value) -> Self {
        Self {
            content_type: Some("application/json;charset=utf-8"),
            body: value.to_string().into_bytes(),
            ..Self::status(200)
        }
    }

    fn xml(document: String) -> Self {
        Self {
            content_type: Some("application/xml"),
            body: document.into_bytes(),
            ..Self::status(200)
        }
    }

    fn text(text: String) -> Self {
        Self {
            content_type: Some("text/plain;charset=utf-8"),
            body: text.into_bytes(),
            ..Self::status(200)
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            HeaderName::from_static("x-jenkins"),
            HeaderValue::from_static(VERSION),
        );
        if let Some(content_type) = self.content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if let Some(location) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            headers.insert(header::LOCATION, location);
        }
        response
    }
}

/// Router over a fresh registry.
pub fn app() -> Router {
    router(Registry::new().shared())
}

pub fn router(db: Db) -> Router {
    Router::new().fallback(handle).with_state(db)
}

/// Serve `db` on `listener` until the process stops.
pub async fn run(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, router(db)).await
}

/// Serve `db` on an ephemeral local port from a background thread.
pub fn spawn(db: Db) -> std::io::Result<SocketAddr> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::spawn(move || {
        let served: std::io::Result<()> = runtime.block_on(async move {
            run(TcpListener::from_std(listener)?, db).await
        });
        if let Err(err) = served {
            eprintln!("fixture server stopped: {err}");
        }
    });
    Ok(addr)
}

/// A local address with nothing listening on it.
pub fn unreachable_addr() -> std::io::Result<SocketAddr> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    listener.local_addr()
}

async fn handle(State(db): State<Db>, request: Request) -> Response {
    let (head, body) = request.into_parts();
    let Ok(body) = to_bytes(body, usize::MAX).await else {
        return Reply::status(400).into_response();
    };
    let header_text = |name: header::HeaderName| {
        head.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let content_type = header_text(header::CONTENT_TYPE).unwrap_or_default();
    let parts = if content_type.starts_with("multipart/form-data") {
        read_parts(&content_type, body.clone()).await
    } else {
        Vec::new()
    };
    let call = Call {
        path: normalize(head.uri.path()),
        query: Query::<HashMap<String, String>>::try_from_uri(&head.uri)
            .map(|Query(query)| query)
            .unwrap_or_default(),
        authorization: header_text(header::AUTHORIZATION),
        method: head.method,
        body,
        parts,
    };

    let mut registry = db.write().await;
    registry.requests.push(RecordedRequest {
        method: call.method.as_str().to_string(),
        path: call.path.clone(),
        query: call.query.clone(),
        authorization: call.authorization.clone(),
        parts: call.parts.clone(),
    });
    registry.serve(&call).into_response()
}

async fn read_parts(content_type: &str, body: Bytes) -> Vec<Part> {
    let Ok(request) = axum::http::Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
    else {
        return Vec::new();
    };
    let Ok(mut multipart) = Multipart::from_request(request, &()).await else {
        return Vec::new();
    };

    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        match field.bytes().await {
            Ok(bytes) => parts.push(Part {
                name,
                file_name,
                bytes: bytes.to_vec(),
            }),
            Err(_) => break,
        }
    }
    parts
}
