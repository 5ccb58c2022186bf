use crate::error::PackageError;
use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::Result;
use log::info;
use std::path::Path;

/// Downloads a tarball to `dest` with retry support. Returns the size in bytes.
#[tracing::instrument(skip(runtime, dest, http_client))]
pub async fn download_file<R: Runtime + ?Sized>(
    runtime: &R,
    url: &str,
    dest: &Path,
    http_client: &HttpClient,
) -> Result<u64> {
    info!("Downloading {}...", url);

    let size = http_client
        .download_file(url, || {
            runtime.create_file(dest).map_err(|e| {
                e.context(PackageError::filesystem(format!(
                    "cannot create download file {:?}",
                    dest
                )))
            })
        })
        .await?;

    info!("Download complete ({} bytes).", size);
    Ok(size)
}
