//! [`RepositorySync`] on libgit2.
use std::path::Path;

use chrono::Utc;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, RemoteCallbacks, Repository};

use super::auth::AuthConfig;
use super::{RepositoryInfo, RepositorySync};
use crate::error::SyncError;

/// Remote fetched from on update.
const REMOTE: &str = "origin";

/// libgit2 retries the credentials callback after every rejection.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Clones with [`RepoBuilder`] and updates by fetch + fast-forward.
#[derive(Debug, Clone, Default)]
pub struct GitSync {
    auth: AuthConfig,
}

impl GitSync {
    /// Sync with the given credentials.
    #[must_use]
    pub const fn new(auth: AuthConfig) -> Self {
        Self { auth }
    }

    fn fetch_options(&self) -> FetchOptions<'_> {
        let mut attempts = 0u32;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }
            self.auth.credential(username_from_url, allowed)
        });
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options
    }
}

impl RepositorySync for GitSync {
    fn clone_repository(
        &self,
        url: &str,
        dest: &Path,
        branch: Option<&str>,
    ) -> Result<RepositoryInfo, SyncError> {
        tracing::debug!(url, dest = %dest.display(), "cloning source repository");
        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        if let Some(branch) = branch {
            builder.branch(branch);
        }
        let repo = builder.clone(url, dest).map_err(SyncError::git("clone"))?;
        info(&repo, dest)
    }

    fn update(&self, path: &Path, branch: Option<&str>) -> Result<RepositoryInfo, SyncError> {
        let repo = Repository::open(path).map_err(SyncError::git("open"))?;
        let branch = match branch {
            Some(b) => b.to_string(),
            None => current_branch(&repo, path)?,
        };
        tracing::debug!(path = %path.display(), branch = %branch, "updating source repository");

        let mut remote = repo.find_remote(REMOTE).map_err(SyncError::git("fetch"))?;
        remote
            .fetch(&[branch.as_str()], Some(&mut self.fetch_options()), None)
            .map_err(SyncError::git("fetch"))?;

        let fetch_head = repo
            .find_reference("FETCH_HEAD")
            .map_err(SyncError::git("fetch"))?;
        let incoming = repo
            .reference_to_annotated_commit(&fetch_head)
            .map_err(SyncError::git("fetch"))?;
        let (analysis, _) = repo
            .merge_analysis(&[&incoming])
            .map_err(SyncError::git("merge analysis"))?;

        if analysis.is_up_to_date() {
            tracing::debug!(branch = %branch, "source repository already up to date");
        } else if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{branch}");
            match repo.find_reference(&refname) {
                Ok(mut reference) => {
                    reference
                        .set_target(incoming.id(), "converge: fast-forward")
                        .map_err(SyncError::git("fast-forward"))?;
                }
                Err(_) => {
                    repo.reference(&refname, incoming.id(), true, "converge: create branch")
                        .map_err(SyncError::git("fast-forward"))?;
                }
            }
            repo.set_head(&refname).map_err(SyncError::git("fast-forward"))?;
            repo.checkout_head(Some(CheckoutBuilder::new().force()))
                .map_err(SyncError::git("checkout"))?;
        } else {
            return Err(SyncError::Diverged(branch));
        }
        info(&repo, path)
    }
}

/// Name of the branch `HEAD` points at.
fn current_branch(repo: &Repository, path: &Path) -> Result<String, SyncError> {
    let head = repo.head().map_err(SyncError::git("read HEAD"))?;
    if !head.is_branch() {
        return Err(SyncError::DetachedHead(path.display().to_string()));
    }
    head.shorthand()
        .map(String::from)
        .ok_or_else(|| SyncError::DetachedHead(path.display().to_string()))
}

fn info(repo: &Repository, path: &Path) -> Result<RepositoryInfo, SyncError> {
    let commit = repo
        .head()
        .and_then(|head| head.peel_to_commit())
        .map_err(SyncError::git("read HEAD"))?;
    Ok(RepositoryInfo {
        local_path: path.to_path_buf(),
        last_commit: commit.id().to_string(),
        last_update_time: Utc::now(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use git2::{Oid, RepositoryInitOptions, Signature};
    use std::fs;

    fn init_origin(path: &Path) -> Repository {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        Repository::init_opts(path, &opts).unwrap()
    }

    fn commit_file(repo: &Repository, name: &str, content: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, &format!("add {name}"), &tree, &parents)
            .unwrap()
    }

    fn url(path: &Path) -> String {
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn clone_checks_out_origin_head() {
        let tmp = tempfile::tempdir().unwrap();
        let origin = init_origin(&tmp.path().join("origin"));
        let head = commit_file(&origin, "bashrc", "export A=1\n");

        let dest = tmp.path().join("checkout");
        let info = GitSync::default()
            .clone_repository(&url(&tmp.path().join("origin")), &dest, Some("main"))
            .unwrap();
        assert_eq!(info.last_commit, head.to_string());
        assert_eq!(fs::read_to_string(dest.join("bashrc")).unwrap(), "export A=1\n");
    }

    #[test]
    fn update_fast_forwards_to_new_commits() {
        let tmp = tempfile::tempdir().unwrap();
        let origin_path = tmp.path().join("origin");
        let origin = init_origin(&origin_path);
        commit_file(&origin, "bashrc", "v1\n");

        let dest = tmp.path().join("checkout");
        let sync = GitSync::default();
        sync.clone_repository(&url(&origin_path), &dest, None).unwrap();

        let newer = commit_file(&origin, "bashrc", "v2\n");
        let info = sync.update(&dest, None).unwrap();
        assert_eq!(info.last_commit, newer.to_string());
        assert_eq!(fs::read_to_string(dest.join("bashrc")).unwrap(), "v2\n");
    }

    #[test]
    fn update_without_new_commits_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let origin_path = tmp.path().join("origin");
        let origin = init_origin(&origin_path);
        let head = commit_file(&origin, "vimrc", "set nu\n");

        let dest = tmp.path().join("checkout");
        let sync = GitSync::default();
        sync.clone_repository(&url(&origin_path), &dest, None).unwrap();
        let info = sync.update(&dest, Some("main")).unwrap();
        assert_eq!(info.last_commit, head.to_string());
    }

    #[test]
    fn diverged_checkout_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let origin_path = tmp.path().join("origin");
        let origin = init_origin(&origin_path);
        commit_file(&origin, "a", "1\n");

        let dest = tmp.path().join("checkout");
        let sync = GitSync::default();
        sync.clone_repository(&url(&origin_path), &dest, None).unwrap();

        commit_file(&origin, "a", "origin\n");
        let local = Repository::open(&dest).unwrap();
        let local_head = commit_file(&local, "b", "local\n");

        let err = sync.update(&dest, None).unwrap_err();
        assert!(matches!(err, SyncError::Diverged(ref b) if b == "main"));
        assert_eq!(
            local.head().unwrap().target().unwrap(),
            local_head,
            "local branch untouched"
        );
    }

    #[test]
    fn detached_head_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let origin_path = tmp.path().join("origin");
        let origin = init_origin(&origin_path);
        let head = commit_file(&origin, "a", "1\n");

        let dest = tmp.path().join("checkout");
        let sync = GitSync::default();
        sync.clone_repository(&url(&origin_path), &dest, None).unwrap();
        Repository::open(&dest).unwrap().set_head_detached(head).unwrap();

        let err = sync.update(&dest, None).unwrap_err();
        assert!(matches!(err, SyncError::DetachedHead(_)));
    }

    #[test]
    fn clone_of_missing_remote_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = GitSync::default()
            .clone_repository(
                &url(&tmp.path().join("nope")),
                &tmp.path().join("checkout"),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Git { ref operation, .. } if operation == "clone"));
    }
}
