//! Lazy materialization of the remote hierarchy.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::CloneMethod;
use crate::git::GitOps;
use crate::gitlab::{
    Group, GroupContent, GroupId, GitlabError, Project, RemoteFetcher, User, UserContent, UserId,
};
use crate::sync::{OperationKind, RepoEntry, RepoRegistry, SyncJob, SyncQueue, SyncState};
use crate::util::FetchCache;

use super::{FsError, Result};

// =============================================================================
// Public Types
// =============================================================================

/// Tree behavior knobs, owned by the validated configuration.
#[derive(Debug, Clone)]
pub struct TreeParam {
    /// Groups materialized at the root.
    pub root_group_ids: Vec<GroupId>,
    /// Users materialized at the root.
    pub user_ids: Vec<UserId>,
    /// Also materialize the token's user at the root.
    pub include_current_user: bool,
    /// Operation performed on first access to a project.
    pub clone_method: CloneMethod,
    /// Schedule a pull when a ready, clean working copy is accessed.
    pub auto_pull: bool,
}

/// What a path resolves to, from the driver's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedNode {
    /// A directory (groups, users, and project placeholders).
    Directory,
    /// A usable working copy.
    Symlink { target: PathBuf },
}

// =============================================================================
// Internal Types
// =============================================================================

/// A position in the tree after walking a path.
enum Node {
    Root,
    Group(GroupId),
    User(UserId),
    Project(Project),
}

/// A named child of a directory node.
#[derive(Clone)]
enum ChildEntry {
    Group(Group),
    User(User),
    Project(Project),
}

// =============================================================================
// VirtualTree
// =============================================================================

/// Composes remote metadata with local sync state.
///
/// Every lookup combines the fetch-once metadata caches with the repository
/// registry; access to a project entry schedules synchronization but never
/// waits for it.
pub struct VirtualTree {
    param: TreeParam,
    fetcher: Arc<dyn RemoteFetcher>,
    git: Arc<dyn GitOps>,
    queue: Arc<SyncQueue>,
    registry: Arc<RepoRegistry>,
    group_heads: FetchCache<GroupId, Arc<Group>, GitlabError>,
    group_contents: FetchCache<GroupId, Arc<GroupContent>, GitlabError>,
    user_heads: FetchCache<UserId, Arc<User>, GitlabError>,
    user_contents: FetchCache<UserId, Arc<UserContent>, GitlabError>,
    current_user: FetchCache<(), Arc<User>, GitlabError>,
}

impl VirtualTree {
    /// Assemble the tree from its collaborators.
    pub fn new(
        param: TreeParam,
        fetcher: Arc<dyn RemoteFetcher>,
        git: Arc<dyn GitOps>,
        queue: Arc<SyncQueue>,
        registry: Arc<RepoRegistry>,
    ) -> Self {
        Self {
            param,
            fetcher,
            git,
            queue,
            registry,
            group_heads: FetchCache::new(),
            group_contents: FetchCache::new(),
            user_heads: FetchCache::new(),
            user_contents: FetchCache::new(),
            current_user: FetchCache::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Driver-facing interface
    // -------------------------------------------------------------------------

    /// List the child names of the directory at `path`, in sorted order.
    pub async fn list_children(&self, path: &Path) -> Result<Vec<String>> {
        let node = self.walk(path).await?;
        match node {
            // A project placeholder is an empty directory until it is ready.
            Node::Project(_) => Ok(Vec::new()),
            node => Ok(self.children_of(&node).await?.into_keys().collect()),
        }
    }

    /// Resolve `path` to a directory or, for a ready project, a symlink to
    /// its working copy. Resolving a project schedules synchronization as a
    /// side effect but returns immediately.
    pub async fn resolve(&self, path: &Path) -> Result<ResolvedNode> {
        let node = self.walk(path).await?;
        match node {
            Node::Project(project) => {
                let entry = self.resolve_project(&project).await;
                match entry.state() {
                    SyncState::Ready => Ok(ResolvedNode::Symlink {
                        target: entry.local_path().to_path_buf(),
                    }),
                    _ => Ok(ResolvedNode::Directory),
                }
            }
            _ => Ok(ResolvedNode::Directory),
        }
    }

    /// Resolve `path` and return the project's sync entry, if `path` names a
    /// project.
    pub async fn project_at(&self, path: &Path) -> Result<Option<Arc<RepoEntry>>> {
        match self.walk(path).await? {
            Node::Project(project) => Ok(Some(self.resolve_project(&project).await)),
            _ => Ok(None),
        }
    }

    /// Get or create the registry entry for a project, scheduling work as
    /// its state demands. Idempotent: repeated calls return the same entry
    /// and schedule at most one job at a time.
    pub async fn resolve_project(&self, project: &Project) -> Arc<RepoEntry> {
        let entry = self.registry.entry(project);

        match entry.state() {
            SyncState::Unsynced | SyncState::Failed => {
                let kind = match self.param.clone_method {
                    CloneMethod::Init => OperationKind::Initialize,
                    CloneMethod::Clone => OperationKind::Clone,
                };
                let job = SyncJob::new(project, entry.local_path().to_path_buf(), kind);
                let outcome = self.queue.enqueue(job);
                debug!(project_id = project.id, ?kind, ?outcome, "requested sync");
            }
            SyncState::Ready if self.param.auto_pull => {
                self.maybe_auto_pull(project, &entry).await;
            }
            _ => {}
        }

        entry
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Schedule an advisory pull, but only for a clean working copy checked
    /// out on the project's default branch. Local changes are never
    /// overwritten.
    async fn maybe_auto_pull(&self, project: &Project, entry: &Arc<RepoEntry>) {
        match self.git.worktree_status(entry.local_path()).await {
            Ok(status) => {
                let on_default = status.branch.as_deref() == Some(project.default_branch.as_str());
                if status.is_clean && on_default {
                    let job = SyncJob::new(
                        project,
                        entry.local_path().to_path_buf(),
                        OperationKind::Pull,
                    );
                    let outcome = self.queue.enqueue(job);
                    debug!(project_id = project.id, ?outcome, "requested auto-pull");
                } else {
                    debug!(
                        project_id = project.id,
                        is_clean = status.is_clean,
                        on_default,
                        "auto-pull skipped"
                    );
                }
            }
            Err(e) => {
                warn!(project_id = project.id, error = %e, "worktree probe failed, skipping auto-pull");
            }
        }
    }

    /// Walk `path` from the root. Fails with `NotFound` for an unknown name
    /// and `NotADirectory` when a project appears mid-path.
    async fn walk(&self, path: &Path) -> Result<Node> {
        let mut node = Node::Root;

        for component in path.components() {
            let name = match component {
                Component::RootDir | Component::CurDir => continue,
                Component::Normal(name) => name
                    .to_str()
                    .ok_or_else(|| FsError::NotFound(path.display().to_string()))?,
                _ => return Err(FsError::NotFound(path.display().to_string())),
            };

            if matches!(node, Node::Project(_)) {
                return Err(FsError::NotADirectory(path.display().to_string()));
            }

            let children = self.children_of(&node).await?;
            node = match children.get(name) {
                Some(ChildEntry::Group(group)) => Node::Group(group.id),
                Some(ChildEntry::User(user)) => Node::User(user.id),
                Some(ChildEntry::Project(project)) => Node::Project(project.clone()),
                None => return Err(FsError::NotFound(path.display().to_string())),
            };
        }

        Ok(node)
    }

    /// The named children of a directory node.
    async fn children_of(&self, node: &Node) -> Result<BTreeMap<String, ChildEntry>> {
        match node {
            Node::Root => Ok(self.root_children().await),
            Node::Group(gid) => {
                let content = self.group_content(*gid).await?;
                Ok(group_child_names(&content))
            }
            Node::User(uid) => {
                let content = self.user_content(*uid).await?;
                Ok(project_child_names(&content.projects))
            }
            Node::Project(_) => Ok(BTreeMap::new()),
        }
    }

    /// Assemble the root: configured groups, configured users, and the
    /// current user. Entries whose metadata cannot be fetched are skipped
    /// (and retried on the next listing); the rest of the root stays usable.
    async fn root_children(&self) -> BTreeMap<String, ChildEntry> {
        let group_futures = self
            .param
            .root_group_ids
            .iter()
            .map(|&gid| self.group_head(gid));
        let user_futures = self.param.user_ids.iter().map(|&uid| self.user_head(uid));

        let mut groups = Vec::new();
        for (gid, result) in self
            .param
            .root_group_ids
            .iter()
            .zip(join_all(group_futures).await)
        {
            match result {
                Ok(group) => groups.push((*group).clone()),
                Err(e) => warn!(group_id = gid, error = %e, "skipping unfetchable root group"),
            }
        }

        let mut users = Vec::new();
        for (uid, result) in self.param.user_ids.iter().zip(join_all(user_futures).await) {
            match result {
                Ok(user) => users.push((*user).clone()),
                Err(e) => warn!(user_id = uid, error = %e, "skipping unfetchable root user"),
            }
        }

        if self.param.include_current_user {
            match self
                .current_user
                .get_or_fetch((), || async {
                    self.fetcher.fetch_current_user().await.map(Arc::new)
                })
                .await
            {
                Ok(user) => users.push((*user).clone()),
                Err(e) => warn!(error = %e, "skipping unfetchable current user"),
            }
        }

        let mut names = BTreeMap::new();
        groups.sort_by_key(|g| g.id);
        for group in groups {
            insert_child(&mut names, group.name.clone(), group.id, ChildEntry::Group(group));
        }
        users.sort_by_key(|u| u.id);
        for user in users {
            insert_child(&mut names, user.name.clone(), user.id, ChildEntry::User(user));
        }
        names
    }

    async fn group_head(&self, gid: GroupId) -> std::result::Result<Arc<Group>, GitlabError> {
        self.group_heads
            .get_or_fetch(gid, || async {
                self.fetcher.fetch_group(gid).await.map(Arc::new)
            })
            .await
    }

    async fn group_content(&self, gid: GroupId) -> std::result::Result<Arc<GroupContent>, GitlabError> {
        self.group_contents
            .get_or_fetch(gid, || async {
                self.fetcher.fetch_group_content(gid).await.map(Arc::new)
            })
            .await
    }

    async fn user_head(&self, uid: UserId) -> std::result::Result<Arc<User>, GitlabError> {
        self.user_heads
            .get_or_fetch(uid, || async {
                self.fetcher.fetch_user(uid).await.map(Arc::new)
            })
            .await
    }

    async fn user_content(&self, uid: UserId) -> std::result::Result<Arc<UserContent>, GitlabError> {
        self.user_contents
            .get_or_fetch(uid, || async {
                self.fetcher.fetch_user_content(uid).await.map(Arc::new)
            })
            .await
    }
}

// =============================================================================
// Name Assignment
// =============================================================================

/// Named children of a group: subgroups, then projects.
fn group_child_names(content: &GroupContent) -> BTreeMap<String, ChildEntry> {
    let mut names = BTreeMap::new();

    let mut subgroups = content.subgroups.clone();
    subgroups.sort_by_key(|g| g.id);
    for group in subgroups {
        insert_child(&mut names, group.name.clone(), group.id, ChildEntry::Group(group));
    }

    let mut projects = content.projects.clone();
    projects.sort_by_key(|p| p.id);
    for project in projects {
        insert_child(&mut names, project.name.clone(), project.id, ChildEntry::Project(project));
    }

    names
}

fn project_child_names(projects: &[Project]) -> BTreeMap<String, ChildEntry> {
    let mut names = BTreeMap::new();
    let mut projects = projects.to_vec();
    projects.sort_by_key(|p| p.id);
    for project in projects {
        insert_child(&mut names, project.name.clone(), project.id, ChildEntry::Project(project));
    }
    names
}

/// Insert a child under its name, disambiguating duplicates with an id
/// suffix. Insertion order is sorted by id, so the assignment is
/// deterministic regardless of fetch order, and no entry is ever dropped.
fn insert_child(
    names: &mut BTreeMap<String, ChildEntry>,
    name: String,
    id: u64,
    entry: ChildEntry,
) {
    if names.contains_key(&name) {
        let fallback = format!("{}-{}", name, id);
        warn!(%name, %fallback, "duplicate entry name, disambiguating");
        names.insert(fallback, entry);
    } else {
        names.insert(name, entry);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{GitError, PullOutcome, Result as GitResult, WorktreeStatus};
    use crate::gitlab::Result as GitlabResult;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;
    use tokio::time::sleep;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeFetcher {
        groups: HashMap<GroupId, Group>,
        group_contents: HashMap<GroupId, GroupContent>,
        users: HashMap<UserId, User>,
        user_contents: HashMap<UserId, UserContent>,
        current: Option<User>,
        failing_groups: HashSet<GroupId>,
        content_calls: AtomicU32,
    }

    impl FakeFetcher {
        fn content_call_count(&self) -> u32 {
            self.content_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteFetcher for FakeFetcher {
        async fn fetch_group(&self, gid: GroupId) -> GitlabResult<Group> {
            self.groups
                .get(&gid)
                .cloned()
                .ok_or_else(|| GitlabError::Request(format!("no group {}", gid)))
        }

        async fn fetch_group_content(&self, gid: GroupId) -> GitlabResult<GroupContent> {
            self.content_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_groups.contains(&gid) {
                return Err(GitlabError::Request("scripted outage".to_string()));
            }
            self.group_contents
                .get(&gid)
                .cloned()
                .ok_or_else(|| GitlabError::Request(format!("no group {}", gid)))
        }

        async fn fetch_user(&self, uid: UserId) -> GitlabResult<User> {
            self.users
                .get(&uid)
                .cloned()
                .ok_or_else(|| GitlabError::Request(format!("no user {}", uid)))
        }

        async fn fetch_current_user(&self) -> GitlabResult<User> {
            self.current
                .clone()
                .ok_or_else(|| GitlabError::Request("no token".to_string()))
        }

        async fn fetch_user_content(&self, uid: UserId) -> GitlabResult<UserContent> {
            self.user_contents
                .get(&uid)
                .cloned()
                .ok_or_else(|| GitlabError::Request(format!("no user {}", uid)))
        }
    }

    /// Scripted git adapter with a controllable worktree status.
    struct FakeGit {
        sync_calls: AtomicU32,
        pull_calls: AtomicU32,
        status: Mutex<WorktreeStatus>,
        gate: Option<Arc<Semaphore>>,
    }

    impl FakeGit {
        fn new() -> Self {
            Self {
                sync_calls: AtomicU32::new(0),
                pull_calls: AtomicU32::new(0),
                status: Mutex::new(WorktreeStatus {
                    branch: Some("master".to_string()),
                    is_clean: true,
                }),
                gate: None,
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new()
            }
        }

        fn set_status(&self, branch: &str, is_clean: bool) {
            *self.status.lock().unwrap() = WorktreeStatus {
                branch: Some(branch.to_string()),
                is_clean,
            };
        }

        async fn pass_gate(&self) {
            if let Some(ref gate) = self.gate {
                gate.acquire().await.unwrap().forget();
            }
        }
    }

    #[async_trait]
    impl GitOps for FakeGit {
        async fn init_repo(&self, _path: &Path, _url: &str, _branch: &str) -> GitResult<()> {
            self.sync_calls.fetch_add(1, Ordering::SeqCst);
            self.pass_gate().await;
            Ok(())
        }

        async fn clone_repo(&self, path: &Path, url: &str, branch: &str) -> GitResult<()> {
            self.init_repo(path, url, branch).await
        }

        async fn pull_repo(&self, _path: &Path, _branch: &str) -> GitResult<PullOutcome> {
            self.pull_calls.fetch_add(1, Ordering::SeqCst);
            self.pass_gate().await;
            Ok(PullOutcome::FastForwarded)
        }

        async fn worktree_status(&self, _path: &Path) -> GitResult<WorktreeStatus> {
            Ok(self.status.lock().unwrap().clone())
        }
    }

    // -------------------------------------------------------------------------
    // Fixture
    // -------------------------------------------------------------------------

    fn group(id: GroupId, name: &str, parent: Option<GroupId>) -> Group {
        Group {
            id,
            name: name.to_string(),
            parent_id: parent,
        }
    }

    fn proj(id: u64, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            default_branch: "master".to_string(),
            clone_url: format!("https://gitlab.example.com/{}.git", name),
        }
    }

    struct Fixture {
        _dir: TempDir,
        tree: VirtualTree,
        registry: Arc<RepoRegistry>,
        queue: Arc<SyncQueue>,
        fetcher: Arc<FakeFetcher>,
        git: Arc<FakeGit>,
    }

    fn build(fetcher: FakeFetcher, git: FakeGit, param: TreeParam, queue_capacity: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(RepoRegistry::new(dir.path().to_path_buf()));
        let fetcher = Arc::new(fetcher);
        let git = Arc::new(git);
        let queue = SyncQueue::start(
            queue_capacity,
            2,
            Arc::clone(&registry),
            git.clone() as Arc<dyn GitOps>,
        );
        let tree = VirtualTree::new(
            param,
            fetcher.clone() as Arc<dyn RemoteFetcher>,
            git.clone() as Arc<dyn GitOps>,
            Arc::clone(&queue),
            Arc::clone(&registry),
        );
        Fixture {
            _dir: dir,
            tree,
            registry,
            queue,
            fetcher,
            git,
        }
    }

    fn default_param() -> TreeParam {
        TreeParam {
            root_group_ids: vec![1],
            user_ids: vec![],
            include_current_user: false,
            clone_method: CloneMethod::Init,
            auto_pull: false,
        }
    }

    /// A root group "root" (id 1) containing projects proj-a and proj-b.
    fn two_project_fetcher() -> FakeFetcher {
        let mut fetcher = FakeFetcher::default();
        fetcher.groups.insert(1, group(1, "root", None));
        fetcher.group_contents.insert(
            1,
            GroupContent {
                subgroups: vec![],
                projects: vec![proj(101, "proj-a"), proj(102, "proj-b")],
            },
        );
        fetcher
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_listing_and_sync_to_ready_symlinks() {
        let fx = build(two_project_fetcher(), FakeGit::new(), default_param(), 10);

        let names = fx.tree.list_children(Path::new("/")).await.unwrap();
        assert_eq!(names, vec!["root"]);

        let names = fx.tree.list_children(Path::new("/root")).await.unwrap();
        assert_eq!(names, vec!["proj-a", "proj-b"]);

        // First resolution returns placeholders and schedules one job each.
        let a = fx.tree.resolve(Path::new("/root/proj-a")).await.unwrap();
        let b = fx.tree.resolve(Path::new("/root/proj-b")).await.unwrap();
        assert_eq!(a, ResolvedNode::Directory);
        assert_eq!(b, ResolvedNode::Directory);

        wait_until(|| fx.queue.in_flight() == 0).await;
        assert_eq!(fx.git.sync_calls.load(Ordering::SeqCst), 2);

        // Both now resolve to symlinks with distinct targets.
        let a = fx.tree.resolve(Path::new("/root/proj-a")).await.unwrap();
        let b = fx.tree.resolve(Path::new("/root/proj-b")).await.unwrap();
        match (&a, &b) {
            (
                ResolvedNode::Symlink { target: target_a },
                ResolvedNode::Symlink { target: target_b },
            ) => {
                assert_ne!(target_a, target_b);
                assert!(target_a.ends_with("101-proj-a"));
                assert!(target_b.ends_with("102-proj-b"));
            }
            other => panic!("expected two symlinks, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_project_is_idempotent() {
        let gate = Arc::new(Semaphore::new(0));
        let fx = build(
            two_project_fetcher(),
            FakeGit::gated(Arc::clone(&gate)),
            default_param(),
            10,
        );

        let project = proj(101, "proj-a");
        let first = fx.tree.resolve_project(&project).await;
        let second = fx.tree.resolve_project(&project).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fx.queue.in_flight(), 1);

        gate.add_permits(1);
        wait_until(|| fx.queue.in_flight() == 0).await;

        // Exactly one adapter invocation despite two resolutions.
        assert_eq!(fx.git.sync_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.state(), SyncState::Ready);
    }

    #[tokio::test]
    async fn test_clone_method_selects_operation() {
        let mut param = default_param();
        param.clone_method = CloneMethod::Clone;
        let fx = build(two_project_fetcher(), FakeGit::new(), param, 10);

        fx.tree.resolve(Path::new("/root/proj-a")).await.unwrap();
        wait_until(|| fx.queue.in_flight() == 0).await;
        assert_eq!(fx.git.sync_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_pull_skips_unclean_worktree() {
        let mut param = default_param();
        param.auto_pull = true;
        let fx = build(two_project_fetcher(), FakeGit::new(), param, 10);

        // A working copy from an earlier run: the probe marks it Ready.
        let entry_path = fx.registry.local_path_for(&proj(101, "proj-a"));
        std::fs::create_dir_all(entry_path.join(".git")).unwrap();

        fx.git.set_status("master", false);
        let resolved = fx.tree.resolve(Path::new("/root/proj-a")).await.unwrap();

        // Still a symlink, still Ready, and no pull was scheduled.
        assert!(matches!(resolved, ResolvedNode::Symlink { .. }));
        assert_eq!(fx.queue.in_flight(), 0);
        assert_eq!(fx.git.pull_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.registry.get(101).unwrap().state(), SyncState::Ready);
    }

    #[tokio::test]
    async fn test_auto_pull_skips_other_branch() {
        let mut param = default_param();
        param.auto_pull = true;
        let fx = build(two_project_fetcher(), FakeGit::new(), param, 10);

        let entry_path = fx.registry.local_path_for(&proj(101, "proj-a"));
        std::fs::create_dir_all(entry_path.join(".git")).unwrap();

        fx.git.set_status("feature-branch", true);
        fx.tree.resolve(Path::new("/root/proj-a")).await.unwrap();

        assert_eq!(fx.git.pull_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_pull_schedules_for_clean_default_branch() {
        let mut param = default_param();
        param.auto_pull = true;
        let fx = build(two_project_fetcher(), FakeGit::new(), param, 10);

        let entry_path = fx.registry.local_path_for(&proj(101, "proj-a"));
        std::fs::create_dir_all(entry_path.join(".git")).unwrap();

        fx.git.set_status("master", true);
        fx.tree.resolve(Path::new("/root/proj-a")).await.unwrap();

        wait_until(|| fx.queue.in_flight() == 0).await;
        assert_eq!(fx.git.pull_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.registry.get(101).unwrap().state(), SyncState::Ready);
    }

    #[tokio::test]
    async fn test_failing_subgroup_scoped_to_that_node() {
        let mut fetcher = FakeFetcher::default();
        fetcher.groups.insert(1, group(1, "root", None));
        fetcher.group_contents.insert(
            1,
            GroupContent {
                subgroups: vec![group(2, "good", Some(1)), group(3, "bad", Some(1))],
                projects: vec![proj(101, "proj-a")],
            },
        );
        fetcher.group_contents.insert(
            2,
            GroupContent {
                subgroups: vec![],
                projects: vec![proj(201, "nested")],
            },
        );
        fetcher.failing_groups.insert(3);

        let fx = build(fetcher, FakeGit::new(), default_param(), 10);

        // The parent lists all children, including the failing subgroup.
        let names = fx.tree.list_children(Path::new("/root")).await.unwrap();
        assert_eq!(names, vec!["bad", "good", "proj-a"]);

        // Only the failing node errors; its sibling stays usable.
        let err = fx.tree.list_children(Path::new("/root/bad")).await;
        assert!(matches!(err, Err(FsError::Metadata(_))));
        let names = fx.tree.list_children(Path::new("/root/good")).await.unwrap();
        assert_eq!(names, vec!["nested"]);
    }

    #[tokio::test]
    async fn test_group_content_fetched_once() {
        let fx = build(two_project_fetcher(), FakeGit::new(), default_param(), 10);

        for _ in 0..3 {
            fx.tree.list_children(Path::new("/root")).await.unwrap();
        }
        assert_eq!(fx.fetcher.content_call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_content_fetch_is_retried() {
        let mut fetcher = FakeFetcher::default();
        fetcher.groups.insert(1, group(1, "root", None));
        fetcher.failing_groups.insert(1);
        let fx = build(fetcher, FakeGit::new(), default_param(), 10);

        assert!(fx.tree.list_children(Path::new("/root")).await.is_err());
        assert!(fx.tree.list_children(Path::new("/root")).await.is_err());

        // Errors are not memoized: each listing attempt re-fetches.
        assert_eq!(fx.fetcher.content_call_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_disambiguated() {
        let mut fetcher = FakeFetcher::default();
        fetcher.groups.insert(1, group(1, "root", None));
        fetcher.group_contents.insert(
            1,
            GroupContent {
                // A subgroup and two projects all fighting for "dup".
                subgroups: vec![group(5, "dup", Some(1))],
                projects: vec![proj(102, "dup"), proj(101, "dup")],
            },
        );
        fetcher
            .group_contents
            .insert(5, GroupContent::default());
        let fx = build(fetcher, FakeGit::new(), default_param(), 10);

        let names = fx.tree.list_children(Path::new("/root")).await.unwrap();
        // Subgroups claim names first; projects follow in id order.
        assert_eq!(names, vec!["dup", "dup-101", "dup-102"]);

        // Every entry stays reachable.
        assert_eq!(
            fx.tree.list_children(Path::new("/root/dup")).await.unwrap(),
            Vec::<String>::new()
        );
        let resolved = fx.tree.resolve(Path::new("/root/dup-101")).await.unwrap();
        assert_eq!(resolved, ResolvedNode::Directory);
    }

    #[tokio::test]
    async fn test_users_and_current_user_at_root() {
        let mut fetcher = two_project_fetcher();
        fetcher.users.insert(7, User {
            id: 7,
            name: "alice".to_string(),
        });
        fetcher.user_contents.insert(
            7,
            UserContent {
                projects: vec![proj(700, "dotfiles")],
            },
        );
        fetcher.current = Some(User {
            id: 9,
            name: "me".to_string(),
        });

        let mut param = default_param();
        param.user_ids = vec![7];
        param.include_current_user = true;
        let fx = build(fetcher, FakeGit::new(), param, 10);

        let names = fx.tree.list_children(Path::new("/")).await.unwrap();
        assert_eq!(names, vec!["alice", "me", "root"]);

        let names = fx.tree.list_children(Path::new("/alice")).await.unwrap();
        assert_eq!(names, vec!["dotfiles"]);

        let resolved = fx.tree.resolve(Path::new("/alice/dotfiles")).await.unwrap();
        assert_eq!(resolved, ResolvedNode::Directory);
        wait_until(|| fx.queue.in_flight() == 0).await;
        assert_eq!(fx.registry.get(700).unwrap().state(), SyncState::Ready);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let fx = build(two_project_fetcher(), FakeGit::new(), default_param(), 10);

        let err = fx.tree.resolve(Path::new("/root/zzz")).await;
        assert!(matches!(err, Err(FsError::NotFound(_))));

        let err = fx.tree.list_children(Path::new("/nope")).await;
        assert!(matches!(err, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_path_through_project_is_not_a_directory() {
        let fx = build(two_project_fetcher(), FakeGit::new(), default_param(), 10);

        let err = fx.tree.resolve(Path::new("/root/proj-a/src")).await;
        assert!(matches!(err, Err(FsError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_project_at_returns_entry() {
        let fx = build(two_project_fetcher(), FakeGit::new(), default_param(), 10);

        let entry = fx
            .tree
            .project_at(Path::new("/root/proj-a"))
            .await
            .unwrap()
            .expect("project entry");
        assert_eq!(entry.project_id(), 101);

        let none = fx.tree.project_at(Path::new("/root")).await.unwrap();
        assert!(none.is_none());
    }
}
