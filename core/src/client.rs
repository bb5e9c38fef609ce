//! Entry point for talking to one CI server.
//!
//! # Design
//! `JenkinsClient` owns the `RequestDispatcher`; every wrapper it hands out
//! (`Job`, `Folder`, `Node`, `View`, `Build`) borrows it and carries its own
//! freshly created `RemoteResourceHandle`. Handles are never cached: each
//! lookup is a new round trip.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ClientConfig;
use crate::decode::{Discard, Structured};
use crate::dispatcher::RequestDispatcher;
use crate::error::ApiError;
use crate::folder::Folder;
use crate::http::RequestDescriptor;
use crate::job::{self, Build, Job};
use crate::reconcile::MutationOutcome;
use crate::resource::RemoteResourceHandle;
use crate::types::{
    BuildRef, FingerprintRecord, JobRef, PluginList, PluginRecord, QueueRecord, ServerInfo,
};

/// Path of the build queue.
pub const QUEUE_PATH: &str = "/queue";

#[derive(Debug)]
pub struct JenkinsClient {
    dispatcher: RequestDispatcher,
    version: Option<String>,
    info: Option<ServerInfo>,
}

impl JenkinsClient {
    /// Build a client without contacting the server. Call [`init`](Self::init)
    /// to check the connection.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let config = config.validated()?;
        Ok(Self {
            dispatcher: RequestDispatcher::new(&config),
            version: None,
            info: None,
        })
    }

    /// Route all of this client's log events through `dispatch`.
    #[must_use]
    pub fn with_logger(mut self, dispatch: tracing::Dispatch) -> Self {
        self.dispatcher = self.dispatcher.with_logger(dispatch);
        self
    }

    /// Fetch the root record and the server version. Fails if the server
    /// cannot be reached or does not answer 200.
    pub fn init(mut self) -> Result<Self, ApiError> {
        let request = RequestDescriptor::get("/").structured();
        let response = self
            .dispatcher
            .send(&request, &Structured::<ServerInfo>::new())?;
        let version = response.envelope.header("X-Jenkins").map(str::to_string);
        let server_info = response.into_value("/")?;

        self.dispatcher.observe(|| {
            info!(
                url = self.dispatcher.base_url(),
                version = version.as_deref().unwrap_or("unknown"),
                "connected to server"
            )
        });
        self.version = version;
        self.info = Some(server_info);
        Ok(self)
    }

    /// Server version from the `X-Jenkins` header seen by `init`.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Root record from the last successful `init` or `poll`.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.info.as_ref()
    }

    /// Fetch the root record.
    pub fn info(&self) -> Result<ServerInfo, ApiError> {
        let mut handle = RemoteResourceHandle::<ServerInfo>::new(&self.dispatcher, "/");
        Ok(handle.fetch()?.clone())
    }

    /// Refresh the cached root record and return the raw status.
    pub fn poll(&mut self) -> Result<u16, ApiError> {
        let mut handle = RemoteResourceHandle::<ServerInfo>::new(&self.dispatcher, "/");
        let status = handle.poll()?;
        if let Some(server_info) = handle.into_snapshot() {
            self.info = Some(server_info);
        }
        Ok(status)
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    pub fn get_job(&self, name: &str) -> Result<Job<'_>, ApiError> {
        Job::get(&self.dispatcher, "", name)
    }

    /// Names, URLs and colors of the top-level jobs, without fetching each.
    pub fn get_all_job_names(&self) -> Result<Vec<JobRef>, ApiError> {
        Ok(self.info()?.jobs)
    }

    /// Every top-level job, fetched one by one.
    pub fn get_all_jobs(&self) -> Result<Vec<Job<'_>>, ApiError> {
        self.get_all_job_names()?
            .iter()
            .map(|job| self.get_job(&job.name))
            .collect()
    }

    /// Create a job from its `config.xml`.
    pub fn create_job(&self, config_xml: &str, name: &str) -> Result<Job<'_>, ApiError> {
        Job::create(&self.dispatcher, "", name, config_xml)
    }

    pub fn copy_job(&self, from: &str, to: &str) -> Result<Job<'_>, ApiError> {
        Job::copy(&self.dispatcher, "", from, to)
    }

    pub fn rename_job(&self, from: &str, to: &str) -> Result<Job<'_>, ApiError> {
        let mut job = Job::at(&self.dispatcher, "", from);
        job.rename(to)?;
        Ok(job)
    }

    pub fn delete_job(&self, name: &str) -> Result<MutationOutcome, ApiError> {
        job::delete_item(&self.dispatcher, "", name)
    }

    /// Trigger a build. Returns the queue item id when the server reports it.
    pub fn build_job(
        &self,
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<Option<u64>, ApiError> {
        Job::at(&self.dispatcher, "", name).invoke(params)
    }

    /// Trigger a build with file parameters.
    pub fn build_job_with_files(
        &self,
        name: &str,
        files: &[PathBuf],
        params: &HashMap<String, String>,
    ) -> Result<Option<u64>, ApiError> {
        Job::at(&self.dispatcher, "", name).invoke_with_files(files, params)
    }

    pub fn get_build(&self, job: &str, number: u64) -> Result<Build<'_>, ApiError> {
        self.get_job(job)?.get_build(number)
    }

    /// Numbers and URLs of every build of `job`.
    pub fn get_all_build_ids(&self, job: &str) -> Result<Vec<BuildRef>, ApiError> {
        self.get_job(job)?.build_ids()
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    pub fn get_folder(&self, name: &str) -> Result<Folder<'_>, ApiError> {
        Folder::get(&self.dispatcher, "", name)
    }

    pub fn create_folder(&self, name: &str) -> Result<Folder<'_>, ApiError> {
        Folder::create(&self.dispatcher, "", name)
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    pub fn get_queue(&self) -> Result<QueueRecord, ApiError> {
        let mut handle = RemoteResourceHandle::<QueueRecord>::new(&self.dispatcher, QUEUE_PATH);
        Ok(handle.fetch()?.clone())
    }

    pub fn cancel_queue_item(&self, id: u64) -> Result<(), ApiError> {
        let path = format!("{QUEUE_PATH}/cancelItem");
        let request = RequestDescriptor::post(path.clone()).query("id", id.to_string());
        self.dispatcher.send(&request, &Discard)?.into_value(&path)
    }

    // -----------------------------------------------------------------------
    // Plugins
    // -----------------------------------------------------------------------

    /// Installed plugins. `depth` controls how much detail the server returns.
    pub fn get_plugins(&self, depth: u32) -> Result<Vec<PluginRecord>, ApiError> {
        let mut handle =
            RemoteResourceHandle::<PluginList>::new(&self.dispatcher, "/pluginManager")
                .with_query("depth", depth.to_string());
        handle.fetch()?;
        Ok(handle.into_snapshot().map(|list| list.plugins).unwrap_or_default())
    }

    pub fn has_plugin(&self, short_name: &str) -> Result<Option<PluginRecord>, ApiError> {
        Ok(self
            .get_plugins(1)?
            .into_iter()
            .find(|plugin| plugin.short_name == short_name))
    }

    /// Upload a `.hpi`/`.jpi` archive.
    pub fn upload_plugin(&self, archive: &Path) -> Result<(), ApiError> {
        let path = "/pluginManager/uploadPlugin";
        let request =
            RequestDescriptor::post(path).files(vec![archive.to_path_buf()], Default::default());
        self.dispatcher.send(&request, &Discard)?.into_value(path)
    }

    // -----------------------------------------------------------------------
    // Fingerprints
    // -----------------------------------------------------------------------

    pub fn get_fingerprint(&self, id: &str) -> Result<FingerprintRecord, ApiError> {
        let mut handle = RemoteResourceHandle::<FingerprintRecord>::new(
            &self.dispatcher,
            format!("/fingerprint/{id}"),
        );
        Ok(handle.fetch()?.clone())
    }

    /// True when the server knows the artifact hash `id`.
    pub fn validate_fingerprint(&self, id: &str) -> Result<bool, ApiError> {
        let mut handle = RemoteResourceHandle::<FingerprintRecord>::new(
            &self.dispatcher,
            format!("/fingerprint/{id}"),
        );
        let status = handle.poll()?;
        let valid = status == 200 && handle.snapshot().is_some_and(|fp| fp.hash == id);
        if valid {
            self.dispatcher.observe(|| info!(id, "fingerprint is valid"));
        }
        Ok(valid)
    }
}
