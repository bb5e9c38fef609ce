//! Folders (the CloudBees folder plugin item type).
//!
//! A folder is an item like a job, so its children live at
//! `<folder path>/job/<name>` and are created through the folder's own
//! `createItem` endpoint. Every mutation goes through the same
//! reconciliation as at the root.

use std::collections::HashMap;

use crate::dispatcher::RequestDispatcher;
use crate::error::ApiError;
use crate::http::{escape, RequestDescriptor};
use crate::job::{self, Build, Job};
use crate::reconcile::{MutationKind, MutationOutcome};
use crate::resource::RemoteResourceHandle;
use crate::types::{BuildRef, FolderRecord, JobRef};

/// Item class the server uses for folders.
pub const FOLDER_CLASS: &str = "com.cloudbees.hudson.plugins.folder.Folder";

#[derive(Debug)]
pub struct Folder<'a> {
    handle: RemoteResourceHandle<'a, FolderRecord>,
}

impl<'a> Folder<'a> {
    pub(crate) fn get(
        dispatcher: &'a RequestDispatcher,
        parent: &str,
        name: &str,
    ) -> Result<Self, ApiError> {
        let mut handle = RemoteResourceHandle::new(dispatcher, job::item_path(parent, name));
        handle.fetch()?;
        Ok(Self { handle })
    }

    pub(crate) fn create(
        dispatcher: &'a RequestDispatcher,
        parent: &str,
        name: &str,
    ) -> Result<Self, ApiError> {
        let request = RequestDescriptor::post(format!("{parent}/createItem"))
            .query("name", escape(name))
            .query("mode", FOLDER_CLASS);
        let handle = job::create_item(dispatcher, MutationKind::Create, &request, parent, name)?;
        Ok(Self { handle })
    }

    pub fn base_path(&self) -> &str {
        self.handle.base_path()
    }

    pub fn name(&self) -> &str {
        self.handle.identity().unwrap_or_default()
    }

    pub fn description(&self) -> Option<&str> {
        self.details()?.description.as_deref()
    }

    pub fn details(&self) -> Option<&FolderRecord> {
        self.handle.snapshot()
    }

    pub fn poll(&mut self) -> Result<u16, ApiError> {
        self.handle.poll()
    }

    /// Refresh and list the folder's direct children.
    pub fn jobs(&mut self) -> Result<Vec<JobRef>, ApiError> {
        Ok(self.handle.fetch()?.jobs.clone())
    }

    fn dispatcher(&self) -> &'a RequestDispatcher {
        self.handle.dispatcher()
    }

    pub fn get_job(&self, name: &str) -> Result<Job<'a>, ApiError> {
        Job::get(self.dispatcher(), self.base_path(), name)
    }

    pub fn get_folder(&self, name: &str) -> Result<Folder<'a>, ApiError> {
        Folder::get(self.dispatcher(), self.base_path(), name)
    }

    pub fn create_job(&self, config_xml: &str, name: &str) -> Result<Job<'a>, ApiError> {
        Job::create(self.dispatcher(), self.base_path(), name, config_xml)
    }

    pub fn create_folder(&self, name: &str) -> Result<Folder<'a>, ApiError> {
        Folder::create(self.dispatcher(), self.base_path(), name)
    }

    pub fn copy_job(&self, from: &str, to: &str) -> Result<Job<'a>, ApiError> {
        Job::copy(self.dispatcher(), self.base_path(), from, to)
    }

    pub fn delete_job(&self, name: &str) -> Result<MutationOutcome, ApiError> {
        job::delete_item(self.dispatcher(), self.base_path(), name)
    }

    pub fn build_job(
        &self,
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<Option<u64>, ApiError> {
        Job::at(self.dispatcher(), self.base_path(), name).invoke(params)
    }

    pub fn get_build(&self, job: &str, number: u64) -> Result<Build<'a>, ApiError> {
        self.get_job(job)?.get_build(number)
    }

    pub fn get_all_build_ids(&self, job: &str) -> Result<Vec<BuildRef>, ApiError> {
        self.get_job(job)?.build_ids()
    }
}
