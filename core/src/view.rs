//! Views: named job lists shown on the dashboard.

use serde_json::json;

use crate::client::JenkinsClient;
use crate::decode::Discard;
use crate::error::ApiError;
use crate::http::{escape, path_segment, RequestDescriptor};
use crate::job::refresh_created;
use crate::reconcile::{MutationKind, MutationReconciler};
use crate::resource::RemoteResourceHandle;
use crate::types::{JobRef, ViewRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewType {
    List,
    Nested,
    My,
    Dashboard,
    Pipeline,
}

impl ViewType {
    /// Class name the server expects as the view `mode`.
    pub fn class_name(&self) -> &'static str {
        match self {
            ViewType::List => "hudson.model.ListView",
            ViewType::Nested => "hudson.plugins.nested_view.NestedView",
            ViewType::My => "hudson.model.MyView",
            ViewType::Dashboard => "hudson.plugins.view.dashboard.Dashboard",
            ViewType::Pipeline => {
                "au.com.centrumsystems.hudson.plugin.buildpipeline.BuildPipelineView"
            }
        }
    }
}

fn view_path(name: &str) -> String {
    format!("/view/{}", path_segment(name))
}

#[derive(Debug)]
pub struct View<'a> {
    handle: RemoteResourceHandle<'a, ViewRecord>,
}

impl<'a> View<'a> {
    pub fn base_path(&self) -> &str {
        self.handle.base_path()
    }

    pub fn name(&self) -> &str {
        self.handle.identity().unwrap_or_default()
    }

    pub fn description(&self) -> Option<&str> {
        self.details()?.description.as_deref()
    }

    pub fn details(&self) -> Option<&ViewRecord> {
        self.handle.snapshot()
    }

    /// Jobs listed in the last snapshot.
    pub fn jobs(&self) -> &[JobRef] {
        self.details()
            .map(|view| view.jobs.as_slice())
            .unwrap_or_default()
    }

    pub fn poll(&mut self) -> Result<u16, ApiError> {
        self.handle.poll()
    }

    /// Add an existing job to this view and refresh.
    pub fn add_job(&mut self, name: &str) -> Result<(), ApiError> {
        let path = format!("{}/addJobToView", self.base_path());
        let request = RequestDescriptor::post(path.clone()).query("name", escape(name));
        self.handle
            .dispatcher()
            .send(&request, &Discard)?
            .into_value(&path)?;
        self.handle.poll()?;
        Ok(())
    }
}

impl JenkinsClient {
    pub fn get_view(&self, name: &str) -> Result<View<'_>, ApiError> {
        let mut handle = RemoteResourceHandle::new(self.dispatcher(), view_path(name));
        handle.fetch()?;
        Ok(View { handle })
    }

    /// Every view the root lists.
    pub fn get_all_views(&self) -> Result<Vec<View<'_>>, ApiError> {
        self.info()?
            .views
            .iter()
            .map(|view| self.get_view(&view.name))
            .collect()
    }

    /// Create an empty view. Fails if a view with that name already exists.
    pub fn create_view(&self, name: &str, view_type: ViewType) -> Result<View<'_>, ApiError> {
        let path = view_path(name);
        let mut handle = RemoteResourceHandle::<ViewRecord>::new(self.dispatcher(), path.clone());
        if handle.poll()? == 200 {
            return Err(ApiError::AlreadyExists {
                kind: "view",
                name: name.to_string(),
            });
        }

        let mode = view_type.class_name();
        let form = json!({ "name": name, "mode": mode });
        let request = RequestDescriptor::post("/createView")
            .query("name", escape(name))
            .query("mode", mode)
            .query("json", escape(&form.to_string()));
        let mut handle = RemoteResourceHandle::new(self.dispatcher(), path.clone());
        let outcome = MutationReconciler::new(self.dispatcher())
            .reconcile(MutationKind::Create, &request, &mut handle, name)?
            .ensure(&path)?;
        if !outcome.reconciled {
            refresh_created(&mut handle);
        }
        Ok(View { handle })
    }
}
