//! Records decoded from the structured dialect.
//!
//! These mirror the subset of the server's JSON the client reads. Every
//! field has a default so records from older or newer servers still decode.

use serde::{Deserialize, Deserializer, Serialize};

use crate::resource::Identity;

/// Treat an explicit `null` like a missing field. The server sends `null`
/// for some strings (folders have no `color`), which `#[serde(default)]`
/// alone does not cover.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `GET /api/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerInfo {
    pub mode: String,
    pub node_description: String,
    pub num_executors: u32,
    pub jobs: Vec<JobRef>,
    pub views: Vec<ViewRef>,
    pub primary_view: Option<ViewRef>,
    pub use_security: bool,
}

/// Job entry as listed by a parent (root, folder or view).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRef {
    pub name: String,
    pub url: String,
    #[serde(deserialize_with = "nullable")]
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRef {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(rename = "_class")]
    pub class: String,
    pub name: String,
    pub full_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub url: String,
    #[serde(deserialize_with = "nullable")]
    pub color: String,
    pub buildable: bool,
    pub in_queue: bool,
    pub builds: Vec<BuildRef>,
    pub first_build: Option<BuildRef>,
    pub last_build: Option<BuildRef>,
    pub last_completed_build: Option<BuildRef>,
    pub last_successful_build: Option<BuildRef>,
    pub last_failed_build: Option<BuildRef>,
    pub next_build_number: u64,
}

impl Identity for JobRecord {
    fn identity(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FolderRecord {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub url: String,
    pub jobs: Vec<JobRef>,
    pub views: Vec<ViewRef>,
    pub primary_view: Option<ViewRef>,
}

impl Identity for FolderRecord {
    fn identity(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildRecord {
    pub number: u64,
    pub id: String,
    pub display_name: String,
    pub url: String,
    pub building: bool,
    pub result: Option<String>,
    pub duration: u64,
    pub estimated_duration: i64,
    pub timestamp: u64,
    pub queue_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeRecord {
    pub display_name: String,
    pub description: Option<String>,
    pub num_executors: u32,
    pub idle: bool,
    pub offline: bool,
    pub temporarily_offline: bool,
    pub jnlp_agent: bool,
    #[serde(deserialize_with = "nullable")]
    pub offline_cause_reason: String,
}

impl Identity for NodeRecord {
    fn identity(&self) -> &str {
        &self.display_name
    }
}

/// `GET /computer/api/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComputerList {
    pub busy_executors: u32,
    pub total_executors: u32,
    pub computer: Vec<NodeRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewRecord {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub jobs: Vec<JobRef>,
}

impl Identity for ViewRecord {
    fn identity(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueRecord {
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueItem {
    pub id: u64,
    pub why: Option<String>,
    pub blocked: bool,
    pub buildable: bool,
    pub stuck: bool,
    pub in_queue_since: u64,
    pub params: String,
    pub task: JobRef,
}

/// `GET /pluginManager/api/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginList {
    pub plugins: Vec<PluginRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginRecord {
    pub short_name: String,
    pub long_name: String,
    pub version: String,
    pub active: bool,
    pub enabled: bool,
    pub has_update: bool,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FingerprintRecord {
    pub hash: String,
    pub file_name: String,
    pub timestamp: u64,
    pub original: Option<FingerprintOrigin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintOrigin {
    pub name: String,
    pub number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_record_ignores_unknown_fields() {
        let job: JobRecord = serde_json::from_str(
            r#"{"_class":"hudson.model.FreeStyleProject","name":"alpha","color":"blue",
                "healthReport":[],"lastBuild":{"number":3,"url":"http://ci/job/alpha/3/"}}"#,
        )
        .unwrap();
        assert_eq!(job.identity(), "alpha");
        assert_eq!(job.class, "hudson.model.FreeStyleProject");
        assert_eq!(job.last_build.unwrap().number, 3);
        assert!(job.builds.is_empty());
    }

    #[test]
    fn node_identity_is_display_name() {
        let node: NodeRecord =
            serde_json::from_str(r#"{"displayName":"agent-1","offline":true}"#).unwrap();
        assert_eq!(node.identity(), "agent-1");
        assert!(node.offline);
    }

    #[test]
    fn folder_entries_with_null_color_decode() {
        let info: ServerInfo = serde_json::from_str(
            r#"{"jobs":[{"_class":"com.cloudbees.hudson.plugins.folder.Folder",
                "name":"team","url":"http://ci/job/team/","color":null},
                {"name":"alpha","color":"blue"}]}"#,
        )
        .unwrap();
        assert_eq!(info.jobs[0].name, "team");
        assert_eq!(info.jobs[0].color, "");
        assert_eq!(info.jobs[1].color, "blue");
    }

    #[test]
    fn build_result_is_null_while_running() {
        let build: BuildRecord =
            serde_json::from_str(r#"{"number":7,"building":true,"result":null}"#).unwrap();
        assert!(build.building);
        assert_eq!(build.result, None);
    }
}
