//! Jobs and their builds.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::decode::{Discard, RawText, Structured};
use crate::dispatcher::RequestDispatcher;
use crate::error::ApiError;
use crate::http::{escape, path_segment, RequestDescriptor, ResponseEnvelope};
use crate::reconcile::{MutationKind, MutationOutcome, MutationReconciler};
use crate::resource::{Identity, RemoteResourceHandle};
use crate::types::{BuildRecord, BuildRef, JobRecord};

/// Path of item `name` inside `parent` (`""` for the root). `parent` is
/// already encoded; `name` is encoded here.
pub(crate) fn item_path(parent: &str, name: &str) -> String {
    format!("{parent}/job/{}", path_segment(name))
}

/// Create or copy an item under `parent` and reconcile the result against
/// the item's path.
pub(crate) fn create_item<'a, T>(
    dispatcher: &'a RequestDispatcher,
    kind: MutationKind,
    request: &RequestDescriptor,
    parent: &str,
    name: &str,
) -> Result<RemoteResourceHandle<'a, T>, ApiError>
where
    T: DeserializeOwned + Identity,
{
    let path = item_path(parent, name);
    let mut handle = RemoteResourceHandle::new(dispatcher, path.clone());
    let outcome = MutationReconciler::new(dispatcher)
        .reconcile(kind, request, &mut handle, name)?
        .ensure(&path)?;
    if !outcome.reconciled {
        refresh_created(&mut handle);
    }
    Ok(handle)
}

/// Refresh a handle whose create already succeeded. A failed refresh leaves
/// the snapshot empty instead of failing the mutation.
pub(crate) fn refresh_created<T>(handle: &mut RemoteResourceHandle<'_, T>)
where
    T: DeserializeOwned + Identity,
{
    if let Err(err) = handle.poll() {
        let dispatcher = handle.dispatcher();
        dispatcher.observe(|| {
            warn!(path = handle.base_path(), error = %err, "created item could not be refreshed")
        });
    }
}

/// Delete item `name` under `parent`.
pub(crate) fn delete_item(
    dispatcher: &RequestDispatcher,
    parent: &str,
    name: &str,
) -> Result<MutationOutcome, ApiError> {
    let path = item_path(parent, name);
    let request = RequestDescriptor::delete(path.clone());
    let mut target = RemoteResourceHandle::<JobRecord>::new(dispatcher, path.clone());
    MutationReconciler::new(dispatcher)
        .reconcile(MutationKind::Delete, &request, &mut target, name)?
        .ensure(&path)
}

/// Queue item id from a `Location: …/queue/item/<id>/` header.
fn queue_id(envelope: &ResponseEnvelope) -> Option<u64> {
    let location = envelope.header("Location")?;
    let (_, tail) = location.split_once("/queue/item/")?;
    tail.trim_end_matches('/').parse().ok()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AllBuilds {
    all_builds: Vec<BuildRef>,
}

#[derive(Debug)]
pub struct Job<'a> {
    handle: RemoteResourceHandle<'a, JobRecord>,
    name: String,
}

impl<'a> Job<'a> {
    pub(crate) fn at(dispatcher: &'a RequestDispatcher, parent: &str, name: &str) -> Self {
        Self {
            handle: RemoteResourceHandle::new(dispatcher, item_path(parent, name)),
            name: name.to_string(),
        }
    }

    pub(crate) fn get(
        dispatcher: &'a RequestDispatcher,
        parent: &str,
        name: &str,
    ) -> Result<Self, ApiError> {
        let mut job = Self::at(dispatcher, parent, name);
        job.handle.fetch()?;
        Ok(job)
    }

    pub(crate) fn create(
        dispatcher: &'a RequestDispatcher,
        parent: &str,
        name: &str,
        config_xml: &str,
    ) -> Result<Self, ApiError> {
        let request = RequestDescriptor::post(format!("{parent}/createItem"))
            .query("name", escape(name))
            .xml(config_xml);
        let handle = create_item(dispatcher, MutationKind::Create, &request, parent, name)?;
        Ok(Self {
            handle,
            name: name.to_string(),
        })
    }

    pub(crate) fn copy(
        dispatcher: &'a RequestDispatcher,
        parent: &str,
        from: &str,
        to: &str,
    ) -> Result<Self, ApiError> {
        let request = RequestDescriptor::post(format!("{parent}/createItem"))
            .query("name", escape(to))
            .query("mode", "copy")
            .query("from", escape(from));
        let handle = create_item(dispatcher, MutationKind::Copy, &request, parent, to)?;
        Ok(Self {
            handle,
            name: to.to_string(),
        })
    }

    pub fn base_path(&self) -> &str {
        self.handle.base_path()
    }

    /// Name from the last snapshot, or the name it was looked up by before
    /// the first poll.
    pub fn name(&self) -> &str {
        self.handle.identity().unwrap_or(&self.name)
    }

    pub fn description(&self) -> Option<&str> {
        self.details()?.description.as_deref()
    }

    pub fn details(&self) -> Option<&JobRecord> {
        self.handle.snapshot()
    }

    pub fn poll(&mut self) -> Result<u16, ApiError> {
        self.handle.poll()
    }

    /// Encoded path of the folder holding this job (`""` at the root).
    fn parent(&self) -> &str {
        self.base_path()
            .rsplit_once("/job/")
            .map_or("", |(parent, _)| parent)
    }

    fn dispatcher(&self) -> &'a RequestDispatcher {
        self.handle.dispatcher()
    }

    /// Raw `config.xml`.
    pub fn config(&self) -> Result<String, ApiError> {
        let path = format!("{}/config.xml", self.base_path());
        self.dispatcher()
            .send(&RequestDescriptor::get(path.clone()), &RawText)?
            .into_value(&path)
    }

    pub fn update_config(&self, config_xml: &str) -> Result<(), ApiError> {
        let path = format!("{}/config.xml", self.base_path());
        let request = RequestDescriptor::post(path.clone()).xml(config_xml);
        self.dispatcher().send(&request, &Discard)?.into_value(&path)
    }

    pub fn enable(&self) -> Result<(), ApiError> {
        self.toggle("enable")
    }

    pub fn disable(&self) -> Result<(), ApiError> {
        self.toggle("disable")
    }

    /// 400 means the job already was in the requested state.
    fn toggle(&self, action: &str) -> Result<(), ApiError> {
        let path = format!("{}/{action}", self.base_path());
        let response = self
            .dispatcher()
            .send(&RequestDescriptor::post(path.clone()), &Discard)?;
        if response.envelope.is_tolerated() {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: response.status(),
                path,
            })
        }
    }

    /// Trigger a build. Parameters are escaped here.
    pub fn invoke(&self, params: &HashMap<String, String>) -> Result<Option<u64>, ApiError> {
        let endpoint = if params.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let path = format!("{}/{endpoint}", self.base_path());
        let request = RequestDescriptor::post(path.clone())
            .queries(params.iter().map(|(key, value)| (key.clone(), escape(value))));
        self.trigger(&request, &path)
    }

    /// Trigger a build with file parameters; `params` go into the same
    /// multipart body as plain fields.
    pub fn invoke_with_files(
        &self,
        files: &[PathBuf],
        params: &HashMap<String, String>,
    ) -> Result<Option<u64>, ApiError> {
        let path = format!("{}/buildWithParameters", self.base_path());
        let fields: BTreeMap<String, String> = params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let request = RequestDescriptor::post(path.clone()).files(files.to_vec(), fields);
        self.trigger(&request, &path)
    }

    fn trigger(&self, request: &RequestDescriptor, path: &str) -> Result<Option<u64>, ApiError> {
        let response = self.dispatcher().send(request, &Discard)?;
        let queued = queue_id(&response.envelope);
        response.into_value(path)?;
        Ok(queued)
    }

    /// Rename in place. On success this handle points at the new path.
    pub fn rename(&mut self, new_name: &str) -> Result<(), ApiError> {
        let dispatcher = self.dispatcher();
        let parent = self.parent().to_string();
        let request = RequestDescriptor::post(format!("{}/doRename", self.base_path()))
            .query("newName", escape(new_name));
        self.handle = create_item(dispatcher, MutationKind::Rename, &request, &parent, new_name)?;
        self.name = new_name.to_string();
        Ok(())
    }

    /// Copy this job to `new_name` in the same parent.
    pub fn copy_to(&self, new_name: &str) -> Result<Job<'a>, ApiError> {
        Job::copy(self.dispatcher(), self.parent(), &self.name, new_name)
    }

    pub fn delete(self) -> Result<MutationOutcome, ApiError> {
        delete_item(self.dispatcher(), self.parent(), &self.name)
    }

    pub fn get_build(&self, number: u64) -> Result<Build<'a>, ApiError> {
        Build::get(self.dispatcher(), self.base_path(), number)
    }

    /// The most recent build, if the last snapshot lists one.
    pub fn last_build(&self) -> Result<Option<Build<'a>>, ApiError> {
        match self.details().and_then(|job| job.last_build.as_ref()) {
            Some(last) => self.get_build(last.number).map(Some),
            None => Ok(None),
        }
    }

    /// Every build, not just the recent ones listed in the job record.
    pub fn build_ids(&self) -> Result<Vec<BuildRef>, ApiError> {
        let request = RequestDescriptor::get(self.base_path())
            .structured()
            .query("tree", escape("allBuilds[number,url]"));
        let all: AllBuilds = self
            .dispatcher()
            .send(&request, &Structured::<AllBuilds>::new())?
            .into_value(self.base_path())?;
        Ok(all.all_builds)
    }
}

#[derive(Debug)]
pub struct Build<'a> {
    handle: RemoteResourceHandle<'a, BuildRecord>,
}

impl<'a> Build<'a> {
    pub(crate) fn get(
        dispatcher: &'a RequestDispatcher,
        job_path: &str,
        number: u64,
    ) -> Result<Self, ApiError> {
        let mut handle = RemoteResourceHandle::new(dispatcher, format!("{job_path}/{number}"));
        handle.fetch()?;
        Ok(Self { handle })
    }

    pub fn base_path(&self) -> &str {
        self.handle.base_path()
    }

    pub fn details(&self) -> Option<&BuildRecord> {
        self.handle.snapshot()
    }

    pub fn number(&self) -> u64 {
        self.details().map_or(0, |build| build.number)
    }

    /// `SUCCESS`, `FAILURE`, ... or `None` while running.
    pub fn result(&self) -> Option<&str> {
        self.details()?.result.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.details().is_some_and(|build| build.building)
    }

    pub fn poll(&mut self) -> Result<u16, ApiError> {
        self.handle.poll()
    }

    pub fn console_output(&self) -> Result<String, ApiError> {
        let path = format!("{}/consoleText", self.base_path());
        self.handle
            .dispatcher()
            .send(&RequestDescriptor::get(path.clone()), &RawText)?
            .into_value(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Origin;

    fn with_location(location: &str) -> ResponseEnvelope {
        ResponseEnvelope {
            status: 201,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
            origin: Origin::Remote,
        }
    }

    #[test]
    fn item_paths_nest_under_parent() {
        assert_eq!(item_path("", "alpha"), "/job/alpha");
        assert_eq!(item_path("/job/team", "alpha"), "/job/team/job/alpha");
        assert_eq!(item_path("/job/my%20team", "my job"), "/job/my%20team/job/my%20job");
    }

    #[test]
    fn queue_id_is_read_from_location() {
        assert_eq!(queue_id(&with_location("http://ci/queue/item/42/")), Some(42));
        assert_eq!(queue_id(&with_location("http://ci/queue/item/7")), Some(7));
        assert_eq!(queue_id(&with_location("http://ci/job/alpha/")), None);
    }
}
