//! GitHub hosting collaborator: pull-request metadata, changed files, and
//! file content fetches. Thin REST plumbing; all review logic lives in
//! [`crate::review`].

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "pr-review-service";

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("Invalid PR URL: {0}")]
    InvalidPrUrl(String),
}

/// Owner and repository name parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Components of a full pull-request URL.
#[derive(Debug, Clone)]
pub struct PrUrl {
    pub repo: RepoRef,
    pub pr_number: u64,
}

/// Pull-request metadata needed for a review run.
#[derive(Debug, Clone)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub head_sha: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One changed file as reported by the hosting API.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    /// One of `added`, `modified`, `removed` (plus GitHub extras like
    /// `renamed`, treated as modified).
    pub status: String,
    pub patch: Option<String>,
    pub additions: u64,
    pub deletions: u64,
    pub changes: u64,
}

/// Parse a repository URL like `https://github.com/{owner}/{repo}`.
/// A trailing `.git` is stripped.
pub fn parse_repo_url(url: &str) -> Result<RepoRef, GithubError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| GithubError::InvalidRepoUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(GithubError::InvalidRepoUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GithubError::InvalidRepoUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() < 2 {
        return Err(GithubError::InvalidRepoUrl(url.to_string()));
    }

    Ok(RepoRef {
        owner: segments[0].to_string(),
        repo: segments[1].trim_end_matches(".git").to_string(),
    })
}

/// Parse a pull-request URL like
/// `https://github.com/{owner}/{repo}/pull/{number}`.
pub fn parse_pr_url(url: &str) -> Result<PrUrl, GithubError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| GithubError::InvalidPrUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(GithubError::InvalidPrUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GithubError::InvalidPrUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(GithubError::InvalidPrUrl(url.to_string()));
    }

    let pr_number = segments[3]
        .parse::<u64>()
        .map_err(|_| GithubError::InvalidPrUrl(url.to_string()))?;

    Ok(PrUrl {
        repo: RepoRef {
            owner: segments[0].to_string(),
            repo: segments[1].to_string(),
        },
        pr_number,
    })
}

/// The three hosting operations the review pipeline needs. Implemented by
/// [`GithubClient`]; test doubles stand in for it in the task runner tests.
#[async_trait]
pub trait ChangeHost: Send + Sync {
    async fn get_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<PullRequestInfo, GithubError>;

    async fn list_changed_files(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<ChangedFile>, GithubError>;

    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, GithubError>;
}

pub struct GithubClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

#[async_trait]
impl ChangeHost for GithubClient {
    #[instrument(skip(self), fields(owner = %repo.owner, repo = %repo.repo, pr = number))]
    async fn get_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<PullRequestInfo, GithubError> {
        #[derive(serde::Deserialize)]
        struct User {
            login: String,
        }

        #[derive(serde::Deserialize)]
        struct Head {
            sha: String,
        }

        #[derive(serde::Deserialize)]
        struct PullResponse {
            number: u64,
            title: String,
            user: User,
            head: Head,
            created_at: String,
            updated_at: String,
        }

        let url = format!(
            "{API_BASE}/repos/{}/{}/pulls/{}",
            repo.owner, repo.repo, number
        );
        debug!("fetching PR metadata");
        let metadata: PullResponse = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(title = %metadata.title, head = %metadata.head.sha, "received PR metadata");

        Ok(PullRequestInfo {
            number: metadata.number,
            title: metadata.title,
            author: metadata.user.login,
            head_sha: metadata.head.sha,
            created_at: metadata.created_at,
            updated_at: metadata.updated_at,
        })
    }

    #[instrument(skip(self), fields(owner = %repo.owner, repo = %repo.repo, pr = number))]
    async fn list_changed_files(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<ChangedFile>, GithubError> {
        #[derive(serde::Deserialize)]
        struct FileEntry {
            filename: String,
            status: String,
            patch: Option<String>,
            #[serde(default)]
            additions: u64,
            #[serde(default)]
            deletions: u64,
            #[serde(default)]
            changes: u64,
        }

        let url = format!(
            "{API_BASE}/repos/{}/{}/pulls/{}/files",
            repo.owner, repo.repo, number
        );
        debug!("fetching changed file list");
        let entries: Vec<FileEntry> = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(files = entries.len(), "received changed file list");

        Ok(entries
            .into_iter()
            .map(|entry| ChangedFile {
                path: entry.filename,
                status: entry.status,
                patch: entry.patch,
                additions: entry.additions,
                deletions: entry.deletions,
                changes: entry.changes,
            })
            .collect())
    }

    #[instrument(skip(self), fields(owner = %repo.owner, repo = %repo.repo, path, git_ref))]
    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, GithubError> {
        let url = format!(
            "{API_BASE}/repos/{}/{}/contents/{}?ref={}",
            repo.owner, repo.repo, path, git_ref
        );
        // The raw media type avoids the base64-encoded JSON payload.
        let content = self
            .get(&url)
            .header("Accept", "application/vnd.github.raw")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(bytes = content.len(), "received file content");
        Ok(content)
    }
}

/// Detect a language tag from a file extension. Unknown extensions map to
/// `text`.
pub fn detect_language(path: &str) -> &'static str {
    const EXTENSIONS: &[(&str, &str)] = &[
        (".py", "python"),
        (".js", "javascript"),
        (".jsx", "javascript"),
        (".ts", "typescript"),
        (".tsx", "typescript"),
        (".java", "java"),
        (".cpp", "cpp"),
        (".c", "c"),
        (".cs", "csharp"),
        (".php", "php"),
        (".rb", "ruby"),
        (".go", "go"),
        (".rs", "rust"),
        (".swift", "swift"),
        (".kt", "kotlin"),
        (".scala", "scala"),
        (".sql", "sql"),
        (".sh", "bash"),
        (".yml", "yaml"),
        (".yaml", "yaml"),
        (".json", "json"),
        (".xml", "xml"),
        (".html", "html"),
        (".css", "css"),
        (".scss", "scss"),
        (".less", "less"),
        (".md", "markdown"),
        (".txt", "text"),
    ];

    let lower = path.to_lowercase();
    for (ext, language) in EXTENSIONS {
        if lower.ends_with(ext) {
            return language;
        }
    }
    "text"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_repo_url() {
        let repo = parse_repo_url("https://github.com/org/repo").unwrap();
        assert_eq!(repo.owner, "org");
        assert_eq!(repo.repo, "repo");
    }

    #[test]
    fn test_parse_repo_url_strips_git_suffix() {
        let repo = parse_repo_url("https://github.com/org/repo.git").unwrap();
        assert_eq!(repo.repo, "repo");
    }

    #[test]
    fn test_parse_invalid_repo_url() {
        assert!(parse_repo_url("https://example.com/org/repo").is_err());
        assert!(parse_repo_url("not-a-url").is_err());
        assert!(parse_repo_url("https://github.com/only-owner").is_err());
    }

    #[test]
    fn test_parse_valid_pr_url() {
        let url = parse_pr_url("https://github.com/org/repo/pull/42").unwrap();
        assert_eq!(url.repo.owner, "org");
        assert_eq!(url.repo.repo, "repo");
        assert_eq!(url.pr_number, 42);
    }

    #[test]
    fn test_parse_invalid_pr_url() {
        assert!(parse_pr_url("https://example.com").is_err());
        assert!(parse_pr_url("not-a-url").is_err());
        assert!(parse_pr_url("https://github.com/org/repo/pulls/42").is_err());
        assert!(parse_pr_url("https://github.com/org/repo/pull/abc").is_err());
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("src/app.py"), "python");
        assert_eq!(detect_language("lib/index.js"), "javascript");
        assert_eq!(detect_language("web/App.TSX"), "typescript");
        assert_eq!(detect_language("src/main.rs"), "rust");
        assert_eq!(detect_language("Makefile"), "text");
    }
}
