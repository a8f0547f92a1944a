//! GitLab REST API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::PullMethod;

use super::types::{GroupDto, ProjectDto, UserDto};
use super::{Group, GroupContent, GroupId, GitlabError, RemoteFetcher, Result, User, UserContent, UserId};

/// Page size used for every listing endpoint.
const PER_PAGE: usize = 100;

/// A [`RemoteFetcher`] backed by the GitLab REST v4 API.
pub struct GitlabClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    pull_method: PullMethod,
}

impl GitlabClient {
    /// Create a client for the given instance URL.
    ///
    /// `pull_method` decides, once for the process lifetime, which clone-URL
    /// form every fetched project carries.
    pub fn new(base_url: impl Into<String>, token: Option<String>, pull_method: PullMethod) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            pull_method,
        }
    }

    /// Create a client with a custom reqwest client.
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        token: Option<String>,
        pull_method: PullMethod,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            pull_method,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4/{}", self.base_url, path)
    }

    /// GET a single JSON document.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut request = self.client.get(url);
        if let Some(ref token) = self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GitlabError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GitlabError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.json().await.map_err(|e| GitlabError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET a listing endpoint page by page until a short page arrives.
    async fn get_paginated<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1usize;

        loop {
            let page_url = format!("{}?per_page={}&page={}", url, PER_PAGE, page);
            let batch: Vec<T> = self.get_json(&page_url).await?;
            let batch_len = batch.len();
            items.extend(batch);

            if batch_len < PER_PAGE {
                return Ok(items);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl RemoteFetcher for GitlabClient {
    async fn fetch_group(&self, gid: GroupId) -> Result<Group> {
        debug!(group_id = gid, "fetching group");
        let dto: GroupDto = self.get_json(&self.api_url(&format!("groups/{}", gid))).await?;
        Ok(dto.into_group())
    }

    async fn fetch_group_content(&self, gid: GroupId) -> Result<GroupContent> {
        debug!(group_id = gid, "fetching group content");
        let subgroups_url = self.api_url(&format!("groups/{}/subgroups", gid));
        let projects_url = self.api_url(&format!("groups/{}/projects", gid));

        let (subgroups, projects) = tokio::try_join!(
            self.get_paginated::<GroupDto>(&subgroups_url),
            self.get_paginated::<ProjectDto>(&projects_url),
        )?;

        Ok(GroupContent {
            subgroups: subgroups.into_iter().map(GroupDto::into_group).collect(),
            projects: projects
                .into_iter()
                .map(|p| p.into_project(self.pull_method))
                .collect(),
        })
    }

    async fn fetch_user(&self, uid: UserId) -> Result<User> {
        debug!(user_id = uid, "fetching user");
        let dto: UserDto = self.get_json(&self.api_url(&format!("users/{}", uid))).await?;
        Ok(dto.into_user())
    }

    async fn fetch_current_user(&self) -> Result<User> {
        debug!("fetching current user");
        let dto: UserDto = self.get_json(&self.api_url("user")).await?;
        Ok(dto.into_user())
    }

    async fn fetch_user_content(&self, uid: UserId) -> Result<UserContent> {
        debug!(user_id = uid, "fetching user content");
        let projects_url = self.api_url(&format!("users/{}/projects", uid));
        let projects: Vec<ProjectDto> = self.get_paginated(&projects_url).await?;

        Ok(UserContent {
            projects: projects
                .into_iter()
                .map(|p| p.into_project(self.pull_method))
                .collect(),
        })
    }
}
