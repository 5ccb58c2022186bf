use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    http::{Credentials, HttpClient},
    install::{DEFAULT_MAX_CONCURRENCY, PackageInstaller},
    package::{InstallLayout, PackageCatalog, default_install_root},
    registry::{Registry, RegistryClient},
    runtime::Runtime,
    version::{FallbackPolicy, VersionComparer},
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const USERNAME_ENV: &str = "UPKG_USERNAME";
pub const PASSWORD_ENV: &str = "UPKG_PASSWORD";

/// Settings gathered from the command line (and its env fallbacks).
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub install_root: Option<PathBuf>,
    pub registry_url: Option<String>,
    pub jobs: Option<usize>,
    pub timeout: Option<Duration>,
    pub strict_versions: bool,
}

pub struct Config<R: Runtime + 'static, G: Registry = RegistryClient> {
    pub runtime: Arc<R>,
    pub registry: Arc<G>,
    pub http_client: HttpClient,
    pub install_root: PathBuf,
    pub jobs: usize,
    pub comparer: VersionComparer,
}

impl<R: Runtime + 'static> Config<R, RegistryClient> {
    pub fn new(runtime: R, options: ConfigOptions) -> Result<Self> {
        let credentials = registry_credentials(&runtime);

        let client = Client::builder()
            .user_agent(format!("upkg/{}", env!("UPKG_VERSION")))
            .timeout(
                options
                    .timeout
                    .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            )
            .build()
            .context("Failed to build HTTP client")?;

        let http_client = HttpClient::new(client).with_credentials(credentials);
        let registry = RegistryClient::new(http_client.clone(), options.registry_url);

        let install_root = match options.install_root {
            Some(path) => path,
            None => default_install_root(&runtime)?,
        };
        debug!("Using install root {:?}", install_root);

        let comparer = VersionComparer::new(if options.strict_versions {
            FallbackPolicy::Strict
        } else {
            FallbackPolicy::Lexical
        });

        Ok(Self {
            runtime: Arc::new(runtime),
            registry: Arc::new(registry),
            http_client,
            install_root,
            jobs: options.jobs.unwrap_or(DEFAULT_MAX_CONCURRENCY).max(1),
            comparer,
        })
    }
}

impl<R: Runtime + 'static, G: Registry> Config<R, G> {
    pub fn layout(&self) -> InstallLayout<R> {
        InstallLayout::new(Arc::clone(&self.runtime), self.install_root.clone())
    }

    pub fn catalog(&self) -> PackageCatalog<G> {
        PackageCatalog::new(Arc::clone(&self.registry), self.comparer, self.jobs)
    }

    pub fn installer(&self) -> PackageInstaller<R, G> {
        PackageInstaller::new(
            self.layout(),
            Arc::clone(&self.registry),
            self.http_client.clone(),
            self.jobs,
        )
    }
}

/// HTTP Basic credentials from the environment. Both variables must be set.
fn registry_credentials<R: Runtime + ?Sized>(runtime: &R) -> Option<Credentials> {
    match (runtime.env_var(USERNAME_ENV), runtime.env_var(PASSWORD_ENV)) {
        (Ok(username), Ok(password)) => {
            debug!("Using registry credentials for user {}", username);
            Some(Credentials::new(username, password))
        }
        (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
            warn!(
                "Ignoring registry credentials: both {} and {} must be set",
                USERNAME_ENV, PASSWORD_ENV
            );
            None
        }
        (Err(_), Err(_)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use mockito::{Matcher, Server};

    fn runtime_with(username: Option<&str>, password: Option<&str>) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        let (username, password) = (username.map(String::from), password.map(String::from));
        runtime
            .expect_env_var()
            .with(eq(USERNAME_ENV))
            .returning(move |_| username.clone().ok_or(std::env::VarError::NotPresent));
        runtime
            .expect_env_var()
            .with(eq(PASSWORD_ENV))
            .returning(move |_| password.clone().ok_or(std::env::VarError::NotPresent));
        runtime
    }

    /// Checks the Authorization header the configured registry client sends.
    async fn verify_authorization_header(runtime: MockRuntime, expected: Matcher) {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/pkg")
            .match_header("authorization", expected)
            .with_status(200)
            .with_body(r#"{"name": "pkg"}"#)
            .create_async()
            .await;

        let options = ConfigOptions {
            install_root: Some(PathBuf::from("/pkgs")),
            registry_url: Some(server.url()),
            ..Default::default()
        };
        let config = Config::new(runtime, options).unwrap();
        config.registry.fetch_package("pkg").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_config_with_credentials() {
        verify_authorization_header(
            runtime_with(Some("alice"), Some("secret")),
            Matcher::Exact("Basic YWxpY2U6c2VjcmV0".into()),
        )
        .await;
    }

    #[tokio::test]
    async fn test_config_without_credentials() {
        verify_authorization_header(runtime_with(None, None), Matcher::Missing).await;
    }

    #[tokio::test]
    async fn test_config_with_partial_credentials() {
        verify_authorization_header(runtime_with(Some("alice"), None), Matcher::Missing).await;
    }

    #[test]
    fn test_config_defaults() {
        let mut runtime = runtime_with(None, None);
        runtime.expect_is_privileged().returning(|| false);
        runtime
            .expect_home_dir()
            .returning(|| Some(crate::test_utils::test_home()));

        let config = Config::new(runtime, ConfigOptions::default()).unwrap();

        assert_eq!(
            config.install_root,
            crate::test_utils::test_home().join(".upkg").join("packages")
        );
        assert_eq!(config.jobs, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.registry.url(), crate::registry::DEFAULT_REGISTRY_URL);
        assert_eq!(config.comparer.policy(), FallbackPolicy::Lexical);
    }

    #[test]
    fn test_config_options() {
        let options = ConfigOptions {
            install_root: Some(PathBuf::from("/opt/pkgs")),
            registry_url: Some("http://registry.internal:4873/".into()),
            jobs: Some(0),
            timeout: Some(Duration::from_secs(5)),
            strict_versions: true,
        };
        let config = Config::new(runtime_with(None, None), options).unwrap();

        assert_eq!(config.install_root, PathBuf::from("/opt/pkgs"));
        assert_eq!(config.jobs, 1);
        assert_eq!(config.registry.url(), "http://registry.internal:4873");
        assert_eq!(config.comparer.policy(), FallbackPolicy::Strict);
    }
}
