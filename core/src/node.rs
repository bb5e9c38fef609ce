//! Build agents ("nodes" / "computers" in the server's API).

use serde_json::{json, Value};

use crate::client::JenkinsClient;
use crate::decode::Discard;
use crate::dispatcher::RequestDispatcher;
use crate::error::ApiError;
use crate::http::{escape, path_segment, RequestDescriptor};
use crate::job::refresh_created;
use crate::reconcile::{MutationKind, MutationOutcome, MutationReconciler};
use crate::resource::RemoteResourceHandle;
use crate::types::{ComputerList, NodeRecord};

/// Descriptor of a permanent agent.
pub const AGENT_DESCRIPTOR: &str = "hudson.slaves.DumbSlave$DescriptorImpl";

const JNLP_LAUNCHER: &str = "hudson.slaves.JNLPLauncher";
const SSH_LAUNCHER: &str = "hudson.plugins.sshslaves.SSHLauncher";
const RETENTION_ALWAYS: &str = "hudson.slaves.RetentionStrategy$Always";

/// How the scheduler uses an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeMode {
    /// Run any job that fits.
    #[default]
    Normal,
    /// Only run jobs whose label expression names this agent.
    Exclusive,
}

impl NodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMode::Normal => "NORMAL",
            NodeMode::Exclusive => "EXCLUSIVE",
        }
    }
}

/// Settings shared by every agent type.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub name: String,
    pub description: String,
    pub num_executors: u32,
    pub remote_fs: String,
    pub labels: String,
    pub mode: NodeMode,
}

/// An agent the controller starts over SSH.
#[derive(Debug, Clone, Default)]
pub struct SshNodeOptions {
    pub node: NodeOptions,
    pub host: String,
    pub port: u16,
    pub credentials_id: String,
}

fn computer_path(name: &str) -> String {
    format!("/computer/{}", path_segment(name))
}

/// The controller lists itself under a display name but is addressed by a
/// fixed path segment.
fn controller_segment(display_name: &str) -> &str {
    match display_name {
        "master" => "(master)",
        "Built-In Node" => "(built-in)",
        other => other,
    }
}

fn agent_form(options: &NodeOptions, launcher: Value) -> Value {
    json!({
        "name": options.name,
        "nodeDescription": options.description,
        "remoteFS": options.remote_fs,
        "numExecutors": options.num_executors,
        "labelString": options.labels,
        "mode": options.mode.as_str(),
        "type": AGENT_DESCRIPTOR,
        "retentionStrategy": { "stapler-class": RETENTION_ALWAYS, "$class": RETENTION_ALWAYS },
        "nodeProperties": { "stapler-class-bag": "true" },
        "launcher": launcher,
    })
}

#[derive(Debug)]
pub struct Node<'a> {
    handle: RemoteResourceHandle<'a, NodeRecord>,
}

impl<'a> Node<'a> {
    pub fn base_path(&self) -> &str {
        self.handle.base_path()
    }

    pub fn name(&self) -> &str {
        self.handle.identity().unwrap_or_default()
    }

    pub fn details(&self) -> Option<&NodeRecord> {
        self.handle.snapshot()
    }

    pub fn poll(&mut self) -> Result<u16, ApiError> {
        self.handle.poll()
    }

    pub fn is_online(&self) -> bool {
        self.details().is_some_and(|node| !node.offline)
    }

    pub fn is_temporarily_offline(&self) -> bool {
        self.details().is_some_and(|node| node.temporarily_offline)
    }

    /// Flip the agent's temporarily-offline flag and refresh. 400 is accepted
    /// as "nothing to change".
    pub fn toggle_temporarily_offline(&mut self, message: &str) -> Result<(), ApiError> {
        let path = format!("{}/toggleOffline", self.base_path());
        let request = RequestDescriptor::post(path.clone()).query("offlineMessage", escape(message));
        let response = self.handle.dispatcher().send(&request, &Discard)?;
        if !response.envelope.is_tolerated() {
            return Err(ApiError::Status {
                status: response.status(),
                path,
            });
        }
        self.handle.poll()?;
        Ok(())
    }

    pub fn delete(self) -> Result<MutationOutcome, ApiError> {
        delete_node(
            self.handle.dispatcher(),
            self.base_path().to_string(),
            self.name(),
        )
    }
}

fn delete_node(
    dispatcher: &RequestDispatcher,
    path: String,
    name: &str,
) -> Result<MutationOutcome, ApiError> {
    let request = RequestDescriptor::post(format!("{path}/doDelete"));
    let mut target = RemoteResourceHandle::<NodeRecord>::new(dispatcher, path.clone());
    MutationReconciler::new(dispatcher)
        .reconcile(MutationKind::Delete, &request, &mut target, name)?
        .ensure(&path)
}

impl JenkinsClient {
    /// `None` when the agent does not answer 200.
    pub fn get_node(&self, name: &str) -> Result<Option<Node<'_>>, ApiError> {
        let mut handle = RemoteResourceHandle::new(self.dispatcher(), computer_path(name));
        Ok(match handle.poll()? {
            200 => Some(Node { handle }),
            _ => None,
        })
    }

    /// Every agent, including the controller.
    pub fn get_all_nodes(&self) -> Result<Vec<Node<'_>>, ApiError> {
        let mut handle = RemoteResourceHandle::<ComputerList>::new(self.dispatcher(), "/computer");
        let list = handle.fetch()?;
        let mut nodes = Vec::with_capacity(list.computer.len());
        for computer in &list.computer {
            if let Some(node) = self.get_node(controller_segment(&computer.display_name))? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Create an inbound (JNLP) agent. An existing agent with the same name
    /// is returned unchanged.
    pub fn create_node(&self, options: &NodeOptions) -> Result<Node<'_>, ApiError> {
        if let Some(node) = self.get_node(&options.name)? {
            return Ok(node);
        }
        let form = agent_form(options, json!({ "stapler-class": JNLP_LAUNCHER }));
        self.submit_node(&options.name, &form)
    }

    /// Create an agent launched over SSH. Fails if the name is taken.
    pub fn create_ssh_node(&self, options: &SshNodeOptions) -> Result<Node<'_>, ApiError> {
        if self.get_node(&options.node.name)?.is_some() {
            return Err(ApiError::AlreadyExists {
                kind: "node",
                name: options.node.name.clone(),
            });
        }
        let launcher = json!({
            "stapler-class": SSH_LAUNCHER,
            "$class": SSH_LAUNCHER,
            "host": options.host,
            "port": options.port.to_string(),
            "credentialsId": options.credentials_id,
            "launchTimeoutSeconds": "900",
            "maxNumRetries": "30",
            "retryWaitTime": "30",
        });
        let form = agent_form(&options.node, launcher);
        self.submit_node(&options.node.name, &form)
    }

    pub fn delete_node(&self, name: &str) -> Result<MutationOutcome, ApiError> {
        delete_node(self.dispatcher(), computer_path(name), name)
    }

    fn submit_node(&self, name: &str, form: &Value) -> Result<Node<'_>, ApiError> {
        let path = computer_path(name);
        let request = RequestDescriptor::post("/computer/doCreateItem")
            .query("name", escape(name))
            .query("type", escape(AGENT_DESCRIPTOR))
            .query("json", escape(&form.to_string()));
        let mut handle = RemoteResourceHandle::new(self.dispatcher(), path.clone());
        let outcome = MutationReconciler::new(self.dispatcher())
            .reconcile(MutationKind::Create, &request, &mut handle, name)?
            .ensure(&path)?;
        if !outcome.reconciled {
            refresh_created(&mut handle);
        }
        Ok(Node { handle })
    }
}
